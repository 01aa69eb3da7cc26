//! Frame decoder with raw fallback
//!
//! The decoder applies the schema to each captured frame. It never fails:
//! an unknown identifier or a payload that does not match its schema entry
//! degrades to a raw record carrying the payload as hex.

use crate::schema::{Schema, SignalSet};
use crate::types::{DecodedRecord, Frame, LoggerError, RecordSignals, RAW_MESSAGE_NAME};
use std::sync::Arc;
use std::time::Instant;

/// Result of decoding one frame
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// The schema decoded the frame
    Decoded(SignalSet),
    /// Fallback: payload as lowercase hex, with the reason decoding failed
    Raw { payload_hex: String, reason: String },
}

impl DecodeOutcome {
    pub fn is_raw(&self) -> bool {
        matches!(self, DecodeOutcome::Raw { .. })
    }

    /// Build the session row for `frame`, timed against `session_start`
    pub fn into_record(self, frame: &Frame, session_start: Instant) -> DecodedRecord {
        let relative_time = frame
            .received_at()
            .saturating_duration_since(session_start)
            .as_secs_f64();

        let (message_name, signals) = match self {
            DecodeOutcome::Decoded(set) => (set.message_name, RecordSignals::Decoded(set.signals)),
            DecodeOutcome::Raw { payload_hex, .. } => {
                (RAW_MESSAGE_NAME.to_string(), RecordSignals::Raw(payload_hex))
            }
        };

        DecodedRecord {
            relative_time,
            message_name,
            identifier_display: frame.identifier_display(),
            signals,
        }
    }
}

/// Applies the shared schema to captured frames
#[derive(Clone)]
pub struct Decoder {
    schema: Arc<dyn Schema>,
}

impl Decoder {
    pub fn new(schema: Arc<dyn Schema>) -> Self {
        Self { schema }
    }

    /// Decode a frame; always yields exactly one outcome
    pub fn decode(&self, frame: &Frame) -> DecodeOutcome {
        match self.schema.decode(frame.id(), frame.payload()) {
            Ok(set) => {
                log::trace!(
                    "Decoded {} (ID {}) with {} signals",
                    set.message_name,
                    frame.identifier_display(),
                    set.signals.len()
                );
                DecodeOutcome::Decoded(set)
            }
            Err(LoggerError::MessageNotFound(_)) => {
                log::debug!(
                    "Unknown CAN ID {}, logging raw data {}",
                    frame.identifier_display(),
                    frame.payload_hex()
                );
                DecodeOutcome::Raw {
                    payload_hex: frame.payload_hex(),
                    reason: "unknown identifier".to_string(),
                }
            }
            Err(e) => {
                log::warn!(
                    "Decode error: ID {} Data {} Error: {}",
                    frame.identifier_display(),
                    frame.payload_hex(),
                    e
                );
                DecodeOutcome::Raw {
                    payload_hex: frame.payload_hex(),
                    reason: e.to_string(),
                }
            }
        }
    }
}
