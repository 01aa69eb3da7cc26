//! DBC file loader
//!
//! Parses Vector DBC files with `can-dbc` and converts them into the
//! logger's signal database format.

use crate::signals::database::{
    ByteOrder, MessageDefinition, MultiplexerInfo, SignalDatabase, SignalDefinition, ValueType,
};
use crate::types::{LoggerError, Result};
use std::path::Path;

/// Bit 31 of a DBC message id marks a 29-bit identifier
const DBC_EXTENDED_FLAG: u32 = 0x8000_0000;

/// Load several DBC files into one database
pub fn load_dbc_files<P: AsRef<Path>>(paths: &[P]) -> Result<SignalDatabase> {
    let mut db = SignalDatabase::new();
    for path in paths {
        for message in parse_dbc_file(path.as_ref())? {
            db.add_message(message);
        }
    }

    let stats = db.stats();
    log::info!(
        "Signal database ready: {} messages, {} signals",
        stats.num_messages,
        stats.num_signals
    );
    Ok(db)
}

/// Parse a DBC file and return message definitions
pub fn parse_dbc_file(path: &Path) -> Result<Vec<MessageDefinition>> {
    log::info!("Parsing DBC file: {:?}", path);

    let bytes = std::fs::read(path).map_err(|e| {
        LoggerError::DbcParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.dbc")
        .to_string();

    let messages = parse_dbc_bytes(&bytes, &source)?;
    log::info!("Parsed {} messages from {:?}", messages.len(), path);
    Ok(messages)
}

/// Parse DBC content already in memory
pub fn parse_dbc_bytes(bytes: &[u8], source: &str) -> Result<Vec<MessageDefinition>> {
    // Many DBC files are saved as Windows-1252; map bytes 1:1 to chars as Latin-1
    let content = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            log::warn!("DBC file {} is not UTF-8, reading as Latin-1", source);
            bytes.iter().map(|&b| b as char).collect()
        }
    };

    let dbc = can_dbc::DBC::from_slice(content.as_bytes()).map_err(|e| {
        LoggerError::DbcParseError(format!("Failed to parse DBC file {}: {:?}", source, e))
    })?;

    dbc.messages()
        .iter()
        .map(|dbc_msg| convert_message(dbc_msg, source))
        .collect()
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(dbc_msg: &can_dbc::Message, source: &str) -> Result<MessageDefinition> {
    let multiplexer_signal = dbc_msg
        .signals()
        .iter()
        .find(|sig| {
            matches!(
                sig.multiplexer_indicator(),
                can_dbc::MultiplexIndicator::Multiplexor
                    | can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(_)
            )
        })
        .map(|sig| sig.name().to_string());

    let signals = dbc_msg
        .signals()
        .iter()
        .map(|sig| convert_signal(sig, multiplexer_signal.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    let raw_id = dbc_msg.message_id().0;

    Ok(MessageDefinition {
        id: raw_id & !DBC_EXTENDED_FLAG,
        name: dbc_msg.message_name().to_string(),
        size: *dbc_msg.message_size() as usize,
        signals,
        multiplexer_signal,
        source: source.to_string(),
    })
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(
    dbc_sig: &can_dbc::Signal,
    multiplexer_signal: Option<&str>,
) -> Result<SignalDefinition> {
    let byte_order = match dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_type = match dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let switch_value = match dbc_sig.multiplexer_indicator() {
        can_dbc::MultiplexIndicator::MultiplexedSignal(value) => Some(*value),
        can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(value) => Some(*value),
        _ => None,
    };

    let multiplexer_info = match switch_value {
        Some(value) => Some(MultiplexerInfo {
            multiplexer_signal: multiplexer_signal
                .ok_or_else(|| {
                    LoggerError::InvalidSignalDefinition(format!(
                        "Multiplexed signal '{}' but no multiplexer found",
                        dbc_sig.name()
                    ))
                })?
                .to_string(),
            multiplexer_values: vec![value],
        }),
        None => None,
    };

    let length = *dbc_sig.signal_size();
    if length == 0 || length > 64 {
        return Err(LoggerError::InvalidSignalDefinition(format!(
            "Signal '{}' has unsupported length {}",
            dbc_sig.name(),
            length
        )));
    }

    Ok(SignalDefinition {
        name: dbc_sig.name().to_string(),
        start_bit: *dbc_sig.start_bit() as u16,
        length: length as u16,
        byte_order,
        value_type,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        multiplexer_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENGINE_DBC: &str = r#"
VERSION ""

NS_ :
    NS_DESC_
    CM_
    BA_DEF_
    BA_
    VAL_

BS_:

BU_: ECU1 ECU2

BO_ 256 EngineData: 8 ECU1
 SG_ EngineSpeed : 0|16@1+ (1,0) [0|8000] "rpm" ECU2
 SG_ EngineTemp : 16|8@1+ (1,-40) [-40|215] "C" ECU2

BO_ 2147484160 BatteryStatus: 8 ECU1
 SG_ BatteryVoltage : 0|16@1+ (0.01,0) [0|16] "V" ECU2
"#;

    #[test]
    fn test_parse_simple_dbc() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(ENGINE_DBC.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let messages = parse_dbc_file(temp_file.path()).unwrap();
        assert_eq!(messages.len(), 2);

        let msg1 = &messages[0];
        assert_eq!(msg1.id, 0x100);
        assert_eq!(msg1.name, "EngineData");
        assert_eq!(msg1.size, 8);
        assert_eq!(msg1.signals.len(), 2);

        let sig1 = &msg1.signals[0];
        assert_eq!(sig1.name, "EngineSpeed");
        assert_eq!(sig1.start_bit, 0);
        assert_eq!(sig1.length, 16);
        assert_eq!(sig1.factor, 1.0);
        assert_eq!(sig1.offset, 0.0);
    }

    #[test]
    fn test_extended_flag_is_masked() {
        let messages = parse_dbc_bytes(ENGINE_DBC.as_bytes(), "engine.dbc").unwrap();
        let battery = messages.iter().find(|m| m.name == "BatteryStatus").unwrap();
        assert_eq!(battery.id, 0x200);
    }

    #[test]
    fn test_parse_multiplexed_signals() {
        let dbc_content = r#"
VERSION ""

NS_ :

BS_:

BU_: ECU1

BO_ 512 MultiplexedMsg: 8 ECU1
 SG_ Mode M : 0|8@1+ (1,0) [0|3] "" ECU1
 SG_ SignalA m0 : 8|16@1+ (1,0) [0|100] "%" ECU1
 SG_ SignalB m1 : 8|16@1+ (0.1,0) [0|1000] "mV" ECU1
"#;

        let messages = parse_dbc_bytes(dbc_content.as_bytes(), "mux.dbc").unwrap();

        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.multiplexer_signal, Some("Mode".to_string()));
        assert_eq!(msg.signals.len(), 3);

        let sig_b = msg.signals.iter().find(|s| s.name == "SignalB").unwrap();
        let mux = sig_b.multiplexer_info.as_ref().unwrap();
        assert_eq!(mux.multiplexer_signal, "Mode");
        assert_eq!(mux.multiplexer_values, vec![1]);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = load_dbc_files(&["/nonexistent/definitely_missing.dbc"]);
        assert!(matches!(result, Err(LoggerError::DbcParseError(_))));
    }

    #[test]
    fn test_load_merges_files() {
        let mut first = NamedTempFile::new().unwrap();
        first.write_all(ENGINE_DBC.as_bytes()).unwrap();
        first.flush().unwrap();

        let db = load_dbc_files(&[first.path()]).unwrap();
        assert_eq!(db.stats().num_messages, 2);
        assert_eq!(db.stats().num_signals, 3);
        assert!(db.get_message(0x100).is_some());
    }
}
