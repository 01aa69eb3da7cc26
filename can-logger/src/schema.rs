//! Decode table capability
//!
//! The capture engine only sees a `Schema`: something that maps an
//! identifier and payload to a named set of signals, or fails. The DBC-backed
//! `SignalDatabase` is the production implementation.

use crate::message_decoder::MessageDecoder;
use crate::signals::SignalDatabase;
use crate::types::{DecodedSignal, LoggerError, Result};

/// Output of a successful schema decode
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSet {
    /// Message name from the schema entry
    pub message_name: String,
    /// Decoded signals in schema order
    pub signals: Vec<DecodedSignal>,
}

/// A read-only decode table, loaded once and shared by the decoder
pub trait Schema: Send + Sync {
    /// Decode a payload for `id`
    ///
    /// Returns `LoggerError::MessageNotFound` for unknown identifiers and
    /// `LoggerError::InvalidData` when the payload does not match the entry.
    fn decode(&self, id: u32, payload: &[u8]) -> Result<SignalSet>;

    /// Every signal column, `<Message>_<Signal>`, in schema order
    fn signal_columns(&self) -> Vec<String> {
        Vec::new()
    }
}

impl Schema for SignalDatabase {
    fn decode(&self, id: u32, payload: &[u8]) -> Result<SignalSet> {
        let message_def = self
            .get_message(id)
            .ok_or(LoggerError::MessageNotFound(id))?;

        let signals = MessageDecoder::decode_message(payload, message_def)?;
        Ok(SignalSet {
            message_name: message_def.name.clone(),
            signals,
        })
    }

    fn signal_columns(&self) -> Vec<String> {
        self.messages()
            .flat_map(|msg| {
                msg.signals
                    .iter()
                    .map(move |sig| column_name(&msg.name, &sig.name))
            })
            .collect()
    }
}

/// Wide-layout column name for a signal
pub fn column_name(message_name: &str, signal_name: &str) -> String {
    format!("{}_{}", message_name, signal_name)
}
