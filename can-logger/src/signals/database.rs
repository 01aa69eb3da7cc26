//! Signal database
//!
//! Combines message definitions from one or more DBC files into a single
//! decode table keyed by arbitration id.

use std::collections::HashMap;

/// A complete CAN message definition
#[derive(Debug, Clone)]
pub struct MessageDefinition {
    /// CAN message ID (extended flag already masked off)
    pub id: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// All signals in this message, in definition order
    pub signals: Vec<SignalDefinition>,
    /// Multiplexer signal name (if multiplexed)
    pub multiplexer_signal: Option<String>,
    /// Source file (DBC filename)
    pub source: String,
}

/// A CAN signal definition
#[derive(Debug, Clone)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit as written in the DBC
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Multiplexer info (None if not multiplexed)
    pub multiplexer_info: Option<MultiplexerInfo>,
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Signed,
    Unsigned,
}

/// Multiplexer information for multiplexed signals
#[derive(Debug, Clone)]
pub struct MultiplexerInfo {
    /// Name of the multiplexer signal that controls this signal
    pub multiplexer_signal: String,
    /// Multiplexer value(s) for which this signal is active
    pub multiplexer_values: Vec<u64>,
}

/// The decode table
#[derive(Debug, Default)]
pub struct SignalDatabase {
    /// Message definitions by CAN ID
    messages: HashMap<u32, MessageDefinition>,

    /// CAN IDs in load order, for stable column lists
    load_order: Vec<u32>,
}

impl SignalDatabase {
    /// Create a new empty signal database
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message definition; the first definition of an id wins
    pub fn add_message(&mut self, message: MessageDefinition) {
        if let Some(existing) = self.messages.get(&message.id) {
            log::warn!(
                "Duplicate definition for CAN ID 0x{:X}: keeping {} from {}, ignoring {} from {}",
                message.id,
                existing.name,
                existing.source,
                message.name,
                message.source
            );
            return;
        }

        self.load_order.push(message.id);
        self.messages.insert(message.id, message);
    }

    /// Get the message definition for a CAN ID
    pub fn get_message(&self, can_id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&can_id)
    }

    /// Iterate messages in load order
    pub fn messages(&self) -> impl Iterator<Item = &MessageDefinition> {
        self.load_order.iter().filter_map(|id| self.messages.get(id))
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(|msg| msg.signals.len()).sum(),
        }
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn engine_message(source: &str) -> MessageDefinition {
        MessageDefinition {
            id: 0x100,
            name: "EngineData".to_string(),
            size: 2,
            signals: vec![SignalDefinition {
                name: "rpm".to_string(),
                start_bit: 0,
                length: 16,
                byte_order: ByteOrder::LittleEndian,
                value_type: ValueType::Unsigned,
                factor: 1.0,
                offset: 0.0,
                multiplexer_info: None,
            }],
            multiplexer_signal: None,
            source: source.to_string(),
        }
    }

    #[test]
    fn test_empty_database() {
        let db = SignalDatabase::new();
        let stats = db.stats();
        assert_eq!(stats.num_messages, 0);
        assert_eq!(stats.num_signals, 0);
        assert_eq!(db.messages().count(), 0);
    }

    #[test]
    fn test_add_message() {
        let mut db = SignalDatabase::new();
        db.add_message(engine_message("engine.dbc"));

        let stats = db.stats();
        assert_eq!(stats.num_messages, 1);
        assert_eq!(stats.num_signals, 1);

        let msg = db.get_message(0x100).unwrap();
        assert_eq!(msg.name, "EngineData");
        assert_eq!(msg.signals[0].name, "rpm");
        assert_eq!(msg.source, "engine.dbc");
    }

    #[test]
    fn test_first_definition_wins() {
        let mut db = SignalDatabase::new();
        db.add_message(engine_message("first.dbc"));

        let mut other = engine_message("second.dbc");
        other.name = "Shadow".to_string();
        db.add_message(other);

        assert_eq!(db.stats().num_messages, 1);
        assert_eq!(db.get_message(0x100).unwrap().name, "EngineData");
        assert_eq!(db.get_message(0x100).unwrap().source, "first.dbc");
    }
}
