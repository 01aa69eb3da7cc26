//! Signal database and DBC loader
//!
//! This module contains the DBC adapter and the decode table it produces.

pub mod database;
pub mod dbc;

// Re-export key types for convenience
pub use database::{
    ByteOrder, DatabaseStats, MessageDefinition, MultiplexerInfo, SignalDatabase,
    SignalDefinition, ValueType,
};
pub use dbc::{load_dbc_files, parse_dbc_bytes, parse_dbc_file};
