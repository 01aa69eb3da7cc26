//! Message Decoding Engine
//!
//! Extracts signal values from a frame payload based on a message definition.
//! Handles bit extraction, endianness, multiplexing, and physical value
//! conversion. Decoding is strict: any signal that cannot be read makes the
//! whole message fail, so the caller can fall back to a raw record.

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{DecodedSignal, LoggerError, Result, SignalValue};

/// Message decoder - extracts signals from frame payloads
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode every active signal of `message_def` from `data`
    ///
    /// Fails if the payload is shorter than the declared message size, or if
    /// the multiplexer or any active signal cannot be extracted.
    pub fn decode_message(data: &[u8], message_def: &MessageDefinition) -> Result<Vec<DecodedSignal>> {
        if data.len() < message_def.size {
            return Err(LoggerError::InvalidData(format!(
                "{} expects {} bytes, frame has {}",
                message_def.name,
                message_def.size,
                data.len()
            )));
        }

        let multiplexer_value = match &message_def.multiplexer_signal {
            Some(mux_name) => {
                let mux_signal = message_def
                    .signals
                    .iter()
                    .find(|s| s.name == *mux_name)
                    .ok_or_else(|| {
                        LoggerError::InvalidSignalDefinition(format!(
                            "multiplexer '{}' missing from {}",
                            mux_name, message_def.name
                        ))
                    })?;
                Some(Self::extract_signal_value(data, mux_signal)? as u64)
            }
            None => None,
        };

        let mut decoded_signals = Vec::with_capacity(message_def.signals.len());
        for signal in &message_def.signals {
            if let Some(mux_info) = &signal.multiplexer_info {
                match multiplexer_value {
                    Some(current) if mux_info.multiplexer_values.contains(&current) => {}
                    _ => continue,
                }
            }
            decoded_signals.push(Self::decode_signal(data, signal)?);
        }

        Ok(decoded_signals)
    }

    /// Decode a single signal from frame data
    fn decode_signal(data: &[u8], signal: &SignalDefinition) -> Result<DecodedSignal> {
        let raw_value = Self::extract_signal_value(data, signal)?;
        let physical_value = signal.offset + signal.factor * (raw_value as f64);

        let value = if signal.factor == 1.0 && signal.offset == 0.0 && signal.length == 1 {
            // Boolean signal (single bit, no scaling)
            SignalValue::Boolean(raw_value != 0)
        } else if signal.factor != 1.0 || signal.offset != 0.0 {
            SignalValue::Float(physical_value)
        } else {
            SignalValue::Integer(raw_value)
        };

        Ok(DecodedSignal::new(signal.name.clone(), value))
    }

    /// Extract raw signal value from frame data, sign-extended if needed
    fn extract_signal_value(data: &[u8], signal: &SignalDefinition) -> Result<i64> {
        let start_bit = signal.start_bit as usize;
        let length = signal.length as usize;

        let raw_value = match signal.byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => Self::extract_big_endian(data, start_bit, length),
        }
        .ok_or_else(|| {
            LoggerError::InvalidData(format!(
                "signal '{}' ({}|{}) does not fit in {} bytes",
                signal.name,
                start_bit,
                length,
                data.len()
            ))
        })?;

        Ok(match signal.value_type {
            ValueType::Unsigned => raw_value as i64,
            ValueType::Signed => Self::sign_extend(raw_value, length),
        })
    }

    /// Extract signal with little-endian (Intel) byte order
    ///
    /// The start bit is the LSB; bits are numbered LSB-first within each byte.
    fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> Option<u64> {
        if (start_bit + length).div_ceil(8) > data.len() {
            return None;
        }

        let mut result: u64 = 0;
        for i in 0..length {
            let bit_pos = start_bit + i;
            let bit_value = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
            result |= (bit_value as u64) << i;
        }
        Some(result)
    }

    /// Extract signal with big-endian (Motorola) byte order
    ///
    /// DBC numbers Motorola start bits in "sawtooth" order: the start bit is
    /// the MSB, and walking towards the LSB goes down within a byte, then to
    /// bit 7 of the next byte.
    fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> Option<u64> {
        let mut result: u64 = 0;
        let mut bit_pos = start_bit;

        for i in 0..length {
            let byte = *data.get(bit_pos / 8)?;
            let bit_value = (byte >> (bit_pos % 8)) & 0x01;
            result = (result << 1) | bit_value as u64;

            if i + 1 < length {
                bit_pos = if bit_pos % 8 == 0 { bit_pos + 15 } else { bit_pos - 1 };
            }
        }
        Some(result)
    }

    /// Sign-extend a value from N bits to 64 bits
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::database::MultiplexerInfo;

    fn signal(name: &str, start_bit: u16, length: u16, byte_order: ByteOrder) -> SignalDefinition {
        SignalDefinition {
            name: name.to_string(),
            start_bit,
            length,
            byte_order,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            multiplexer_info: None,
        }
    }

    fn message(size: usize, signals: Vec<SignalDefinition>) -> MessageDefinition {
        MessageDefinition {
            id: 0x100,
            name: "EngineData".to_string(),
            size,
            signals,
            multiplexer_signal: None,
            source: "test.dbc".to_string(),
        }
    }

    #[test]
    fn test_extract_little_endian_simple() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_little_endian(&data, 0, 8), Some(0xAB));
    }

    #[test]
    fn test_extract_little_endian_cross_byte() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_little_endian(&data, 0, 16), Some(0xCDAB));
        assert_eq!(MessageDecoder::extract_little_endian(&data, 4, 8), Some(0xDA));
    }

    #[test]
    fn test_extract_little_endian_out_of_range() {
        let data = vec![0xAB];
        assert_eq!(MessageDecoder::extract_little_endian(&data, 4, 8), None);
    }

    #[test]
    fn test_extract_big_endian_simple() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_big_endian(&data, 7, 8), Some(0xAB));
    }

    #[test]
    fn test_extract_big_endian_cross_byte() {
        // Start bit 7 is the MSB of byte 0; 16 bits span bytes 0 and 1
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(MessageDecoder::extract_big_endian(&data, 7, 16), Some(0xABCD));
        // 12 bits starting at bit 3: low nibble of byte 0, then all of byte 1
        assert_eq!(MessageDecoder::extract_big_endian(&data, 3, 12), Some(0xBCD));
    }

    #[test]
    fn test_extract_big_endian_out_of_range() {
        let data = vec![0xAB];
        assert_eq!(MessageDecoder::extract_big_endian(&data, 7, 16), None);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(MessageDecoder::sign_extend(0x7F, 8), 127);
        assert_eq!(MessageDecoder::sign_extend(0xFF, 8), -1);
        assert_eq!(MessageDecoder::sign_extend(0x8000, 16), -32768);
    }

    #[test]
    fn test_decode_message_values() {
        let mut temp = signal("EngineTemp", 16, 8, ByteOrder::LittleEndian);
        temp.offset = -40.0;
        let flag = signal("Running", 24, 1, ByteOrder::LittleEndian);

        let msg = message(
            4,
            vec![signal("rpm", 0, 16, ByteOrder::LittleEndian), temp, flag],
        );

        // rpm = 3000 (0x0BB8), temp raw 120 -> 80.0, running bit set
        let signals = MessageDecoder::decode_message(&[0xB8, 0x0B, 120, 0x01], &msg).unwrap();
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0].value, SignalValue::Integer(3000));
        assert_eq!(signals[1].value, SignalValue::Float(80.0));
        assert_eq!(signals[2].value, SignalValue::Boolean(true));
    }

    #[test]
    fn test_decode_signed_signal() {
        let mut sig = signal("Torque", 0, 8, ByteOrder::LittleEndian);
        sig.value_type = ValueType::Signed;
        let msg = message(1, vec![sig]);

        let signals = MessageDecoder::decode_message(&[0xFE], &msg).unwrap();
        assert_eq!(signals[0].value, SignalValue::Integer(-2));
    }

    #[test]
    fn test_short_payload_fails() {
        let msg = message(8, vec![signal("rpm", 0, 16, ByteOrder::LittleEndian)]);
        let result = MessageDecoder::decode_message(&[0xB8, 0x0B], &msg);
        assert!(matches!(result, Err(LoggerError::InvalidData(_))));
    }

    #[test]
    fn test_multiplexed_message() {
        let mux = signal("Mode", 0, 8, ByteOrder::LittleEndian);
        let mut sig_a = signal("SignalA", 8, 8, ByteOrder::LittleEndian);
        sig_a.multiplexer_info = Some(MultiplexerInfo {
            multiplexer_signal: "Mode".to_string(),
            multiplexer_values: vec![0],
        });
        let mut sig_b = signal("SignalB", 8, 8, ByteOrder::LittleEndian);
        sig_b.multiplexer_info = Some(MultiplexerInfo {
            multiplexer_signal: "Mode".to_string(),
            multiplexer_values: vec![1],
        });

        let mut msg = message(2, vec![mux, sig_a, sig_b]);
        msg.multiplexer_signal = Some("Mode".to_string());

        let signals = MessageDecoder::decode_message(&[0x01, 0x2A], &msg).unwrap();
        let names: Vec<&str> = signals.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Mode", "SignalB"]);
        assert_eq!(signals[1].value, SignalValue::Integer(42));
    }
}
