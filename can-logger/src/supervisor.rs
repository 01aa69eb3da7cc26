//! Capture loop
//!
//! The `Supervisor` owns everything the loop touches: bus, control source,
//! decoder, session manager and status indicator. Each iteration drains
//! control events, then either waits for more (Idle) or receives one frame
//! (Active). Transport and write faults are logged, the indicator goes off,
//! and the loop retries after a fixed backoff; the session stays open.

use crate::bus::BusSource;
use crate::config::LoggerConfig;
use crate::control::ControlSource;
use crate::decoder::Decoder;
use crate::indicator::StatusIndicator;
use crate::session::{SessionManager, SessionState, Transition};
use crate::types::{ControlEvent, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide stop request, raised from the interrupt handler
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters over one run of the loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames_received: u64,
    pub records_written: u64,
    pub raw_records: u64,
    pub transport_faults: u64,
    pub write_faults: u64,
    pub sessions_started: u64,
    pub control_events: u64,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, {} records ({} raw), {} sessions, {} transport faults, {} write faults",
            self.frames_received,
            self.records_written,
            self.raw_records,
            self.sessions_started,
            self.transport_faults,
            self.write_faults
        )
    }
}

/// What one loop iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No session; waited on control input
    Idle,
    /// Receive timed out
    Timeout,
    /// A frame was written to the session file
    Recorded { raw: bool },
    /// Receive failed; backed off
    TransportFault,
    /// Writing the record failed; backed off
    WriteFault,
}

/// The capture engine
pub struct Supervisor<B: BusSource, C: ControlSource> {
    bus: B,
    control: C,
    decoder: Decoder,
    sessions: SessionManager,
    indicator: Box<dyn StatusIndicator>,
    indicator_on: bool,
    receive_timeout: Duration,
    idle_poll: Duration,
    error_backoff: Duration,
    stats: RunStats,
}

impl<B: BusSource, C: ControlSource> Supervisor<B, C> {
    pub fn new(
        bus: B,
        control: C,
        decoder: Decoder,
        sessions: SessionManager,
        indicator: Box<dyn StatusIndicator>,
        config: &LoggerConfig,
    ) -> Self {
        Self {
            bus,
            control,
            decoder,
            sessions,
            indicator,
            indicator_on: false,
            receive_timeout: config.receive_timeout(),
            idle_poll: config.idle_poll(),
            error_backoff: config.error_backoff(),
            stats: RunStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.sessions.state()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Last level written to the indicator
    pub fn indicator_on(&self) -> bool {
        self.indicator_on
    }

    /// Run until `shutdown` is raised, then close any open session
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<RunStats> {
        log::info!("Capture loop started on {}", self.bus.describe());
        self.set_indicator(false);

        while !shutdown.is_triggered() {
            self.step();
        }

        log::info!("Shutdown requested");
        let closed = self.sessions.shutdown();
        self.set_indicator(false);
        log::info!("Run summary: {}", self.stats);

        closed.map(|_| self.stats.clone())
    }

    /// One loop iteration
    pub fn step(&mut self) -> Step {
        while let Some(event) = self.control.try_next() {
            self.apply(event);
        }

        if !self.sessions.is_active() {
            if let Some(event) = self.control.next_timeout(self.idle_poll) {
                self.apply(event);
            }
            return Step::Idle;
        }

        let frame = match self.bus.receive(self.receive_timeout) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Step::Timeout,
            Err(e) => {
                log::warn!("CAN receive error: {}", e);
                self.stats.transport_faults += 1;
                self.back_off();
                return Step::TransportFault;
            }
        };

        self.stats.frames_received += 1;
        let outcome = self.decoder.decode(&frame);
        let raw = outcome.is_raw();

        match self.sessions.append(&frame, outcome) {
            Ok(true) => {
                self.stats.records_written += 1;
                if raw {
                    self.stats.raw_records += 1;
                }
                if !self.indicator_on {
                    self.set_indicator(true);
                }
                Step::Recorded { raw }
            }
            Ok(false) => Step::Timeout,
            Err(e) => {
                log::warn!("Failed to write record: {}", e);
                self.stats.write_faults += 1;
                self.back_off();
                Step::WriteFault
            }
        }
    }

    fn apply(&mut self, event: ControlEvent) {
        self.stats.control_events += 1;
        log::debug!("Control event {} while {}", event, self.sessions.state());

        if event == ControlEvent::ToggleLogging && !self.sessions.is_active() {
            if let Err(e) = self.bus.discard_pending() {
                log::warn!("Could not drain stale frames: {}", e);
            }
        }

        match self.sessions.handle(event) {
            Ok(Transition::Started(_)) => {
                self.stats.sessions_started += 1;
                self.set_indicator(true);
            }
            Ok(Transition::Stopped(_)) => self.set_indicator(false),
            Ok(Transition::Cleared { .. }) | Ok(Transition::ClearRejected) => {}
            Err(e) => {
                log::error!("Failed to apply {}: {}", event, e);
                self.set_indicator(self.sessions.is_active());
            }
        }
    }

    fn back_off(&mut self) {
        self.set_indicator(false);
        std::thread::sleep(self.error_backoff);
    }

    fn set_indicator(&mut self, on: bool) {
        if let Err(e) = self.indicator.set(on) {
            log::warn!("Failed to set status indicator: {}", e);
        }
        self.indicator_on = on;
    }
}
