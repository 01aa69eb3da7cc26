//! CAN Logger Library
//!
//! Capture engine for an unattended CAN bus field logger: frames are read
//! from a bus, decoded against a DBC signal database when possible, and
//! written as CSV session files. Logging is started and stopped by control
//! events from a hardware button or the terminal.
//!
//! # Architecture
//!
//! - `BusSource` delivers frames (SocketCAN on Linux, scripted sources in tests)
//! - `ControlSource` delivers `ControlEvent`s from trigger threads
//! - `Decoder` applies a shared `Schema`, falling back to raw hex records
//! - `SessionManager` owns the Idle/Active state machine and the open file
//! - `Supervisor` runs the loop and the error recovery policy
//!
//! Hardware adapters (`gpio`, `link`) are thin wrappers around sysfs and
//! `ip link`; the CLI crate wires everything together.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_logger::bus::BusSource;
//! use can_logger::{
//!     control_channel, load_dbc_files, Decoder, LoggerConfig, NullIndicator, SessionManager,
//!     ShutdownSignal, Supervisor,
//! };
//! use std::sync::Arc;
//!
//! # fn run<B: BusSource>(bus: B) -> can_logger::Result<()> {
//! let schema = Arc::new(load_dbc_files(&["vehicle.dbc"])?);
//! let config = LoggerConfig::new().with_output_dir("can_logs");
//!
//! let (sender, receiver) = control_channel(config.control_capacity);
//! let sessions = SessionManager::new(&config, Vec::new());
//! let mut supervisor = Supervisor::new(
//!     bus,
//!     receiver,
//!     Decoder::new(schema),
//!     sessions,
//!     Box::new(NullIndicator),
//!     &config,
//! );
//!
//! sender.send(can_logger::ControlEvent::ToggleLogging);
//! let stats = supervisor.run(&ShutdownSignal::new())?;
//! println!("{}", stats);
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod bus;
pub mod config;
pub mod control;
pub mod decoder;
pub mod gpio;
pub mod indicator;
pub mod link;
pub mod schema;
pub mod session;
pub mod signals;
pub mod sink;
pub mod supervisor;
pub mod types;

mod message_decoder;

// Re-export main types for convenience
pub use config::{LoggerConfig, RecordLayout};
pub use control::{control_channel, ControlReceiver, ControlSender, ControlSource, EdgeTrigger};
pub use decoder::{DecodeOutcome, Decoder};
pub use indicator::{NullIndicator, StatusIndicator};
pub use link::LinkManager;
pub use schema::{Schema, SignalSet};
pub use session::{
    clear_sessions, list_sessions, SessionEntry, SessionManager, SessionMetadata, SessionState,
    SessionStatus, Transition,
};
pub use signals::{load_dbc_files, DatabaseStats, SignalDatabase};
pub use supervisor::{RunStats, ShutdownSignal, Step, Supervisor};
pub use types::{
    ControlEvent, DecodedRecord, DecodedSignal, Frame, LoggerError, RecordSignals, Result,
    SignalValue, RAW_MESSAGE_NAME,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
