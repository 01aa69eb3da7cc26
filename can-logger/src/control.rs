//! Control inputs
//!
//! Every trigger (hardware button, terminal command) ends up as a
//! `ControlEvent` on one bounded channel. Producers run on their own threads
//! and only enqueue; the supervisor is the single consumer and the only place
//! session state changes.

use crate::session::SessionStatus;
use crate::types::ControlEvent;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

/// Create the control channel shared by all producers
pub fn control_channel(capacity: usize) -> (ControlSender, ControlReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (ControlSender { tx }, ControlReceiver { rx })
}

/// Producer half; cheap to clone into trigger threads
#[derive(Clone)]
pub struct ControlSender {
    tx: Sender<ControlEvent>,
}

impl ControlSender {
    /// Enqueue without blocking; a full or closed channel drops the event
    pub fn send(&self, event: ControlEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::warn!("Control channel full, dropping {}", event);
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                log::debug!("Control channel closed, dropping {}", event);
                false
            }
        }
    }
}

/// Consumer side of the control stream, as seen by the supervisor
pub trait ControlSource: Send {
    /// Next pending event, without waiting
    fn try_next(&mut self) -> Option<ControlEvent>;

    /// Wait up to `timeout` for an event
    fn next_timeout(&mut self, timeout: Duration) -> Option<ControlEvent>;
}

/// Consumer half of the control channel
pub struct ControlReceiver {
    rx: Receiver<ControlEvent>,
}

impl ControlSource for ControlReceiver {
    fn try_next(&mut self) -> Option<ControlEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn next_timeout(&mut self, timeout: Duration) -> Option<ControlEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // No producers left; keep the caller's pacing
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

/// Drops events that follow an accepted one within `window`
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// True if an event at `now` passes the debounce window
    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

/// Turns hardware edges into debounced `ToggleLogging` events
pub struct EdgeTrigger {
    sender: ControlSender,
    debouncer: Debouncer,
}

impl EdgeTrigger {
    pub fn new(sender: ControlSender, debounce: Duration) -> Self {
        Self {
            sender,
            debouncer: Debouncer::new(debounce),
        }
    }

    /// Report an edge seen at `now`; returns whether an event was queued
    pub fn on_edge(&mut self, now: Instant) -> bool {
        if !self.debouncer.accept(now) {
            log::trace!("Edge within debounce window ignored");
            return false;
        }
        log::debug!("Trigger edge accepted");
        self.sender.send(ControlEvent::ToggleLogging)
    }
}

/// A parsed terminal line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    Clear,
    Ignored,
}

/// Parse one line typed at the terminal
pub fn parse_command(line: &str) -> TerminalCommand {
    if line.trim().eq_ignore_ascii_case("clear") {
        TerminalCommand::Clear
    } else {
        TerminalCommand::Ignored
    }
}

/// Read commands from `input` until EOF, prompting on `output`
///
/// `clear` is refused straight away while `status` reports an active session.
/// Otherwise it asks for confirmation and queues a `ClearRequest` on `y`; the
/// session manager still rejects the request if logging started meanwhile.
pub fn run_terminal<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    sender: &ControlSender,
    status: &SessionStatus,
) -> std::io::Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }

        if parse_command(&line) != TerminalCommand::Clear {
            continue;
        }

        if status.is_active() {
            writeln!(output, "Cannot clear logs while logging is active.")?;
            continue;
        }

        write!(
            output,
            "Are you sure you want to delete all session log files? (Y/N): "
        )?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }

        if line.trim().eq_ignore_ascii_case("y") {
            sender.send(ControlEvent::ClearRequest);
        } else {
            writeln!(output, "Clear canceled.")?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_debouncer_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        assert!(debouncer.accept(start));
        assert!(!debouncer.accept(start + Duration::from_millis(50)));
        assert!(!debouncer.accept(start + Duration::from_millis(299)));
        assert!(debouncer.accept(start + Duration::from_millis(300)));
    }

    #[test]
    fn test_rejected_edge_does_not_extend_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        assert!(debouncer.accept(start));
        assert!(!debouncer.accept(start + Duration::from_millis(200)));
        // Measured from the accepted edge, not the dropped one
        assert!(debouncer.accept(start + Duration::from_millis(350)));
    }

    #[test]
    fn test_edges_50ms_apart_give_one_event() {
        let (sender, mut receiver) = control_channel(8);
        let mut trigger = EdgeTrigger::new(sender, Duration::from_millis(300));

        let start = Instant::now();
        assert!(trigger.on_edge(start));
        assert!(!trigger.on_edge(start + Duration::from_millis(50)));

        assert_eq!(receiver.try_next(), Some(ControlEvent::ToggleLogging));
        assert_eq!(receiver.try_next(), None);
    }

    #[test]
    fn test_full_channel_drops_event() {
        let (sender, mut receiver) = control_channel(1);
        assert!(sender.send(ControlEvent::ToggleLogging));
        assert!(!sender.send(ControlEvent::ClearRequest));

        assert_eq!(receiver.try_next(), Some(ControlEvent::ToggleLogging));
        assert_eq!(receiver.try_next(), None);
    }

    #[test]
    fn test_next_timeout_when_empty() {
        let (_sender, mut receiver) = control_channel(1);
        let start = Instant::now();
        assert_eq!(receiver.next_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("clear\n"), TerminalCommand::Clear);
        assert_eq!(parse_command("  CLEAR  "), TerminalCommand::Clear);
        assert_eq!(parse_command("clear all"), TerminalCommand::Ignored);
        assert_eq!(parse_command(""), TerminalCommand::Ignored);
    }

    #[test]
    fn test_terminal_confirmed_clear() {
        let (sender, mut receiver) = control_channel(4);
        let mut output = Vec::new();

        run_terminal(
            Cursor::new("status\nclear\nY\n"),
            &mut output,
            &sender,
            &SessionStatus::new(),
        )
        .unwrap();

        assert_eq!(receiver.try_next(), Some(ControlEvent::ClearRequest));
        assert_eq!(receiver.try_next(), None);
        assert!(String::from_utf8(output).unwrap().contains("(Y/N)"));
    }

    #[test]
    fn test_terminal_canceled_clear() {
        let (sender, mut receiver) = control_channel(4);
        let mut output = Vec::new();

        run_terminal(
            Cursor::new("clear\nno\n"),
            &mut output,
            &sender,
            &SessionStatus::new(),
        )
        .unwrap();

        assert_eq!(receiver.try_next(), None);
        assert!(String::from_utf8(output).unwrap().contains("Clear canceled."));
    }

    #[test]
    fn test_terminal_clear_refused_while_logging() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = crate::LoggerConfig::new().with_output_dir(dir.path());
        let mut sessions = crate::SessionManager::new(&config, Vec::new());
        sessions.start().unwrap();

        let (sender, mut receiver) = control_channel(4);
        let mut output = Vec::new();
        run_terminal(
            Cursor::new("clear\nclear\n"),
            &mut output,
            &sender,
            &sessions.status(),
        )
        .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(receiver.try_next(), None);
        assert_eq!(text.matches("Cannot clear logs while logging is active.").count(), 2);
        assert!(!text.contains("(Y/N)"));

        sessions.stop().unwrap();
        let mut output = Vec::new();
        run_terminal(Cursor::new("clear\ny\n"), &mut output, &sender, &sessions.status())
            .unwrap();
        assert_eq!(receiver.try_next(), Some(ControlEvent::ClearRequest));
    }
}
