//! Core types for the CAN logger
//!
//! This module defines the values that flow through the capture engine:
//! frames read from the bus, the records written to session files, the
//! control events that drive the session state machine, and the library
//! error type.

use std::fmt;
use std::time::Instant;

/// Message name written for frames that could not be decoded
pub const RAW_MESSAGE_NAME: &str = "RAW_MSG";

/// Maximum payload length of a classic CAN frame
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Result type for logger operations
pub type Result<T> = std::result::Result<T, LoggerError>;

/// Errors that can occur in the logger
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Message not found: CAN ID 0x{0:X}")]
    MessageNotFound(u32),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Bus error: {0}")]
    BusError(String),

    #[error("GPIO error: {0}")]
    GpioError(String),

    #[error("Interface setup failed: {0}")]
    LinkError(String),

    #[error("Operation rejected: logging is active")]
    LoggingActive,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A CAN frame captured from the bus
///
/// Frames are immutable once received. The payload is stored inline since a
/// classic CAN frame never carries more than 8 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    id: u32,
    is_extended: bool,
    data: [u8; MAX_PAYLOAD_LEN],
    len: u8,
    received_at: Instant,
}

impl Frame {
    /// Create a frame, using the extended format only when the id needs it
    pub fn new(id: u32, payload: &[u8], received_at: Instant) -> Result<Self> {
        Self::with_format(id, id > 0x7FF, payload, received_at)
    }

    /// Create a frame with an explicit identifier format
    pub fn with_format(
        id: u32,
        is_extended: bool,
        payload: &[u8],
        received_at: Instant,
    ) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(LoggerError::InvalidFrame(format!(
                "payload of {} bytes exceeds {} bytes",
                payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }

        let max_id = if is_extended { 0x1FFF_FFFF } else { 0x7FF };
        if id > max_id {
            return Err(LoggerError::InvalidFrame(format!(
                "identifier 0x{:X} out of range",
                id
            )));
        }

        let mut data = [0u8; MAX_PAYLOAD_LEN];
        data[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            id,
            is_extended,
            data,
            len: payload.len() as u8,
            received_at,
        })
    }

    /// Convert any `embedded_can` frame (driver frames, test doubles)
    pub fn from_embedded<F: embedded_can::Frame>(frame: &F, received_at: Instant) -> Result<Self> {
        let (id, is_extended) = match frame.id() {
            embedded_can::Id::Standard(id) => (id.as_raw() as u32, false),
            embedded_can::Id::Extended(id) => (id.as_raw(), true),
        };
        Self::with_format(id, is_extended, frame.data(), received_at)
    }

    /// Arbitration identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// True for 29-bit identifiers
    pub fn is_extended(&self) -> bool {
        self.is_extended
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Monotonic capture time
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Lowercase hex encoding of the payload, e.g. `deadbeef`
    pub fn payload_hex(&self) -> String {
        hex_string(self.payload())
    }

    /// Identifier as shown in session files, e.g. `0x100`
    pub fn identifier_display(&self) -> String {
        format!("{:#x}", self.id)
    }
}

/// Lowercase hex encoding without separators
pub fn hex_string(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// A decoded signal with its current value
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    /// Signal name from the schema
    pub name: String,
    /// Physical value
    pub value: SignalValue,
}

impl DecodedSignal {
    pub fn new(name: impl Into<String>, value: SignalValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Signal value types supported by the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    /// Signed integer value
    Integer(i64),
    /// Floating-point value (after scaling/offset)
    Float(f64),
    /// Boolean value (single unscaled bit)
    Boolean(bool),
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Integer(v) => write!(f, "{}", v),
            // Debug keeps full precision and always shows a fraction ("40.0")
            SignalValue::Float(v) => write!(f, "{:?}", v),
            SignalValue::Boolean(v) => write!(f, "{}", if *v { "true" } else { "false" }),
        }
    }
}

/// Signals column of a record: decoded values or the raw payload
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSignals {
    Decoded(Vec<DecodedSignal>),
    Raw(String),
}

impl fmt::Display for RecordSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSignals::Decoded(signals) => {
                write!(f, "{{")?;
                for (i, signal) in signals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", signal.name, signal.value)?;
                }
                write!(f, "}}")
            }
            RecordSignals::Raw(hex) => write!(f, "{}", hex),
        }
    }
}

/// One row of a session file
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// Seconds since the session started
    pub relative_time: f64,
    /// Schema message name, or `RAW_MSG`
    pub message_name: String,
    /// Identifier in `0x…` form
    pub identifier_display: String,
    pub signals: RecordSignals,
}

impl DecodedRecord {
    /// True if the frame could not be decoded
    pub fn is_raw(&self) -> bool {
        matches!(self.signals, RecordSignals::Raw(_))
    }

    /// Time column, fixed at 6 decimals
    pub fn time_display(&self) -> String {
        format!("{:.6}", self.relative_time)
    }
}

/// Events that drive the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Start a session when idle, stop it when active
    ToggleLogging,
    /// Delete all session files (idle only)
    ClearRequest,
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlEvent::ToggleLogging => write!(f, "ToggleLogging"),
            ControlEvent::ClearRequest => write!(f, "ClearRequest"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_long_payload() {
        let result = Frame::new(0x100, &[0u8; 9], Instant::now());
        assert!(matches!(result, Err(LoggerError::InvalidFrame(_))));
    }

    #[test]
    fn test_frame_rejects_out_of_range_id() {
        assert!(Frame::with_format(0x800, false, &[], Instant::now()).is_err());
        assert!(Frame::with_format(0x800, true, &[], Instant::now()).is_ok());
        assert!(Frame::new(0x2000_0000, &[], Instant::now()).is_err());

        let frame = Frame::new(0x999, &[], Instant::now()).unwrap();
        assert!(frame.is_extended());
    }

    #[test]
    fn test_payload_hex_is_lowercase_and_zero_padded() {
        let frame = Frame::new(0x200, &[0x00, 0x0A, 0xFF], Instant::now()).unwrap();
        assert_eq!(frame.payload_hex(), "000aff");
        assert_eq!(hex_string(&[0xB8]), "b8");
    }

    #[test]
    fn test_frame_display_helpers() {
        let frame = Frame::new(0x100, &[0xDE, 0xAD, 0xBE, 0xEF], Instant::now()).unwrap();
        assert_eq!(frame.payload(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(frame.payload_hex(), "deadbeef");
        assert_eq!(frame.identifier_display(), "0x100");
    }

    struct DriverFrame {
        id: embedded_can::Id,
        data: Vec<u8>,
    }

    impl embedded_can::Frame for DriverFrame {
        fn new(id: impl Into<embedded_can::Id>, data: &[u8]) -> Option<Self> {
            Some(Self {
                id: id.into(),
                data: data.to_vec(),
            })
        }

        fn new_remote(id: impl Into<embedded_can::Id>, _dlc: usize) -> Option<Self> {
            Self::new(id, &[])
        }

        fn is_extended(&self) -> bool {
            matches!(self.id, embedded_can::Id::Extended(_))
        }

        fn is_remote_frame(&self) -> bool {
            false
        }

        fn id(&self) -> embedded_can::Id {
            self.id
        }

        fn dlc(&self) -> usize {
            self.data.len()
        }

        fn data(&self) -> &[u8] {
            &self.data
        }
    }

    #[test]
    fn test_from_embedded_frame() {
        use embedded_can::{ExtendedId, Frame as _, StandardId};

        let now = Instant::now();
        let standard = DriverFrame::new(StandardId::new(0x100).unwrap(), &[1, 2]).unwrap();
        let frame = Frame::from_embedded(&standard, now).unwrap();
        assert_eq!(frame.id(), 0x100);
        assert!(!frame.is_extended());
        assert_eq!(frame.payload(), &[1, 2]);

        // Extended format is kept even for small identifiers
        let extended = DriverFrame::new(ExtendedId::new(0x10).unwrap(), &[]).unwrap();
        let frame = Frame::from_embedded(&extended, now).unwrap();
        assert_eq!(frame.id(), 0x10);
        assert!(frame.is_extended());
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::new(0x7FF, &[], Instant::now()).unwrap();
        assert!(frame.payload().is_empty());
        assert_eq!(frame.payload_hex(), "");
    }

    #[test]
    fn test_signal_value_display() {
        assert_eq!(format!("{}", SignalValue::Integer(42)), "42");
        assert_eq!(format!("{}", SignalValue::Float(40.0)), "40.0");
        assert_eq!(format!("{}", SignalValue::Float(3.14159)), "3.14159");
        assert_eq!(format!("{}", SignalValue::Boolean(true)), "true");
    }

    #[test]
    fn test_record_signals_display() {
        let decoded = RecordSignals::Decoded(vec![
            DecodedSignal::new("rpm", SignalValue::Integer(3000)),
            DecodedSignal::new("temp", SignalValue::Float(80.5)),
        ]);
        assert_eq!(decoded.to_string(), "{rpm: 3000, temp: 80.5}");
        assert_eq!(RecordSignals::Raw("deadbeef".into()).to_string(), "deadbeef");
    }
}
