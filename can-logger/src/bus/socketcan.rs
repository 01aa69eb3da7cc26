//! SocketCAN frame source (Linux)

use super::BusSource;
use crate::types::{Frame, LoggerError, Result};
use ::socketcan::{CanFrame, CanSocket, Socket};
use std::io::ErrorKind;
use std::time::{Duration, Instant};

/// Upper bound on frames dropped by one `discard_pending` call
const MAX_DISCARD: usize = 4096;

/// Raw CAN socket bound to one interface
pub struct SocketCanBus {
    channel: String,
    socket: CanSocket,
    timeout: Option<Duration>,
}

impl SocketCanBus {
    /// Open `channel` (e.g. `can0`); the interface must already be up
    pub fn open(channel: &str) -> Result<Self> {
        let socket = CanSocket::open(channel)
            .map_err(|e| LoggerError::BusError(format!("cannot open {}: {}", channel, e)))?;
        log::info!("Opened CAN socket on {}", channel);

        Ok(Self {
            channel: channel.to_string(),
            socket,
            timeout: None,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        // A zero SO_RCVTIMEO blocks forever
        let timeout = timeout.max(Duration::from_millis(1));
        if self.timeout != Some(timeout) {
            self.socket
                .set_read_timeout(timeout)
                .map_err(|e| self.bus_error("set timeout", e))?;
            self.timeout = Some(timeout);
        }
        Ok(())
    }

    fn bus_error(&self, action: &str, e: std::io::Error) -> LoggerError {
        LoggerError::BusError(format!("{} on {}: {}", action, self.channel, e))
    }

    fn convert(&self, frame: CanFrame) -> Result<Frame> {
        let received_at = Instant::now();
        match frame {
            CanFrame::Error(err) => Err(LoggerError::BusError(format!(
                "error frame on {}: {:?}",
                self.channel, err
            ))),
            frame => Frame::from_embedded(&frame, received_at),
        }
    }
}

impl BusSource for SocketCanBus {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        self.set_timeout(timeout)?;

        match self.socket.read_frame() {
            Ok(frame) => self.convert(frame).map(Some),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(self.bus_error("receive", e)),
        }
    }

    fn discard_pending(&mut self) -> Result<usize> {
        self.socket
            .set_nonblocking(true)
            .map_err(|e| self.bus_error("set nonblocking", e))?;

        let mut discarded = 0;
        let outcome = loop {
            if discarded >= MAX_DISCARD {
                break Ok(());
            }
            match self.socket.read_frame() {
                Ok(_) => discarded += 1,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(self.bus_error("drain", e)),
            }
        };

        self.socket
            .set_nonblocking(false)
            .map_err(|e| self.bus_error("set blocking", e))?;
        outcome?;

        if discarded > 0 {
            log::debug!("Discarded {} stale frame(s) on {}", discarded, self.channel);
        }
        Ok(discarded)
    }

    fn describe(&self) -> String {
        self.channel.clone()
    }
}
