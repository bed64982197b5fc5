//! Signal decoding engine
//!
//! Extracts every signal of a message descriptor from a frame payload:
//! bit-field extraction with both CAN byte orders, sign extension, and
//! physical value conversion (`raw * factor + offset`).
//!
//! Payloads shorter than the declared message size are zero-padded rather
//! than rejected - capture tools truncate frames, and the signals that fit
//! are still worth keeping. Failures are per-signal: one signal with a bad
//! bit layout never costs its siblings.

use crate::dictionary::{ByteOrder, MessageDescriptor, SignalSpec, ValueType};
use crate::types::{DecodedSignal, SignalValue};
use std::borrow::Cow;

/// Signal decoder - extracts signals from canonical frame payloads
pub struct SignalDecoder;

impl SignalDecoder {
    /// Decode all signals of a message from a payload
    ///
    /// Signals whose bit range does not fit even the padded payload are
    /// skipped with a debug log; the rest of the message still decodes.
    pub fn decode_message(message: &MessageDescriptor, payload: &[u8]) -> Vec<DecodedSignal> {
        let data = Self::padded(payload, message.size);

        message
            .signals
            .iter()
            .filter_map(|signal| Self::decode_signal(&data, signal))
            .collect()
    }

    /// Zero-pad a payload to the declared message size
    fn padded(payload: &[u8], declared_size: usize) -> Cow<'_, [u8]> {
        if payload.len() >= declared_size {
            Cow::Borrowed(payload)
        } else {
            let mut buf = payload.to_vec();
            buf.resize(declared_size, 0);
            Cow::Owned(buf)
        }
    }

    /// Decode a single signal from payload bytes
    fn decode_signal(data: &[u8], signal: &SignalSpec) -> Option<DecodedSignal> {
        let raw = Self::extract_raw_value(data, signal)?;
        let physical = raw as f64 * signal.factor + signal.offset;

        let value = match signal.choices.as_ref().and_then(|table| table.get(&raw)) {
            Some(label) => SignalValue::Enumerated {
                raw,
                label: label.clone(),
            },
            None => SignalValue::Numeric(physical),
        };

        Some(DecodedSignal {
            name: signal.name.clone(),
            value,
            unit: signal.unit.clone(),
        })
    }

    /// Extract the raw bit-field value of a signal
    ///
    /// Handles bit extraction with proper endianness support.
    fn extract_raw_value(data: &[u8], signal: &SignalSpec) -> Option<i64> {
        let start_bit = signal.start_bit as usize;
        let length = signal.length as usize;

        if length == 0 || length > 64 {
            log::debug!(
                "Signal '{}' has unusable bit length {}",
                signal.name,
                length
            );
            return None;
        }

        // Little-endian signals end at start_bit + length; Motorola start
        // bits name the MSB in LSB-within-byte numbering, so the span is
        // measured from the converted MSB-first position.
        let end_bit = match signal.byte_order {
            ByteOrder::LittleEndian => start_bit + length,
            ByteOrder::BigEndian => Self::motorola_msb_position(start_bit) + length,
        };
        let required_bytes = (end_bit + 7) / 8;
        if required_bytes > data.len() {
            log::debug!(
                "Signal '{}' requires {} bytes but frame only has {} bytes",
                signal.name,
                required_bytes,
                data.len()
            );
            return None;
        }

        let raw = match signal.byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => Self::extract_big_endian(data, start_bit, length),
        };

        Some(match signal.value_type {
            ValueType::Unsigned => raw as i64,
            ValueType::Signed => Self::sign_extend(raw, length),
        })
    }

    /// Extract signal with little-endian (Intel) byte order
    ///
    /// Start bit points to the LSB; bits are numbered LSB to MSB within
    /// each byte.
    fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start_bit + i;
            let byte_idx = bit_pos / 8;
            let bit_in_byte = bit_pos % 8;

            if byte_idx < data.len() {
                let bit_value = (data[byte_idx] >> bit_in_byte) & 0x01;
                result |= (bit_value as u64) << i;
            }
        }

        result
    }

    /// Extract signal with big-endian (Motorola) byte order
    ///
    /// DBC start bits use LSB-within-byte numbering, and for Motorola
    /// signals the start bit names the signal's MSB. A byte-0 signal is
    /// therefore `7|8@0`, not `0|8@0`. The start bit is converted to a
    /// linear MSB-first position, then the signal is read toward its LSB
    /// across descending bit numbers and ascending bytes.
    fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let msb_pos = Self::motorola_msb_position(start_bit);
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = msb_pos + i;
            let byte_idx = bit_pos / 8;
            let bit_in_byte = 7 - (bit_pos % 8);

            if byte_idx < data.len() {
                let bit_value = (data[byte_idx] >> bit_in_byte) & 0x01;
                result |= (bit_value as u64) << (length - 1 - i);
            }
        }

        result
    }

    /// Convert a DBC Motorola start bit to a linear MSB-first bit position
    fn motorola_msb_position(start_bit: usize) -> usize {
        (start_bit / 8) * 8 + (7 - start_bit % 8)
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
    use std::collections::HashMap;

    fn spec(name: &str, start_bit: u16, length: u16) -> SignalSpec {
        SignalSpec {
            name: name.to_string(),
            start_bit,
            length,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            unit: None,
            choices: None,
        }
    }

    fn message(size: usize, signals: Vec<SignalSpec>) -> MessageDescriptor {
        MessageDescriptor {
            id: 0x100,
            name: "TestMsg".to_string(),
            size,
            signals,
        }
    }

    #[test]
    fn test_extract_little_endian_simple() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(SignalDecoder::extract_little_endian(&data, 0, 8), 0xAB);
    }

    #[test]
    fn test_extract_little_endian_cross_byte() {
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(SignalDecoder::extract_little_endian(&data, 0, 16), 0xCDAB);
    }

    #[test]
    fn test_extract_big_endian_simple() {
        // Start bit 7 is the MSB of byte 0: the signal is exactly byte 0
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(SignalDecoder::extract_big_endian(&data, 7, 8), 0xAB);
    }

    #[test]
    fn test_extract_big_endian_cross_byte() {
        // 7|16@0 spans bytes 0-1 in Motorola order
        let data = vec![0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(SignalDecoder::extract_big_endian(&data, 7, 16), 0xABCD);
    }

    #[test]
    fn test_extract_big_endian_mid_byte() {
        // 3|12@0: MSB at byte 0 bit 3, continuing through all of byte 1
        let data = vec![0x0A, 0xBC];
        assert_eq!(SignalDecoder::extract_big_endian(&data, 3, 12), 0xABC);
    }

    #[test]
    fn test_big_endian_byte_signal_decodes_whole_byte() {
        // A 7|8@0 signal in a one-byte message must fit and read the byte
        let mut s = spec("MotSpeed", 7, 8);
        s.byte_order = ByteOrder::BigEndian;

        let msg = message(1, vec![s]);
        let decoded = SignalDecoder::decode_message(&msg, &[171]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].value, SignalValue::Numeric(171.0));
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(SignalDecoder::sign_extend(0x7F, 8), 127);
        assert_eq!(SignalDecoder::sign_extend(0xFF, 8), -1);
        assert_eq!(SignalDecoder::sign_extend(0x8000, 16), -32768);
    }

    #[test]
    fn test_scale_and_offset() {
        let mut temp = spec("EngineTemp", 0, 8);
        temp.factor = 0.5;
        temp.offset = -40.0;

        let msg = message(1, vec![temp]);
        let decoded = SignalDecoder::decode_message(&msg, &[200]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].value, SignalValue::Numeric(60.0));
    }

    #[test]
    fn test_signed_signal() {
        let mut s = spec("Torque", 0, 8);
        s.value_type = ValueType::Signed;

        let msg = message(1, vec![s]);
        let decoded = SignalDecoder::decode_message(&msg, &[0xFB]);
        assert_eq!(decoded[0].value, SignalValue::Numeric(-5.0));
    }

    #[test]
    fn test_enumerated_signal() {
        let mut gear = spec("Gear", 0, 8);
        gear.choices = Some(HashMap::from([
            (0, "NEUTRAL".to_string()),
            (1, "DRIVE".to_string()),
        ]));

        let msg = message(1, vec![gear]);

        let decoded = SignalDecoder::decode_message(&msg, &[1]);
        assert_eq!(
            decoded[0].value,
            SignalValue::Enumerated {
                raw: 1,
                label: "DRIVE".to_string()
            }
        );

        // Raw value outside the table falls back to numeric
        let decoded = SignalDecoder::decode_message(&msg, &[9]);
        assert_eq!(decoded[0].value, SignalValue::Numeric(9.0));
    }

    #[test]
    fn test_truncated_payload_zero_padded() {
        // 8-byte message, 4 bytes supplied: both signals still decode,
        // the one past the supplied bytes reads the zero padding
        let low = spec("Low", 0, 16);
        let high = spec("High", 48, 16);
        let msg = message(8, vec![low, high]);

        let decoded = SignalDecoder::decode_message(&msg, &[0x10, 0x20, 0x30, 0x40]);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].value, SignalValue::Numeric(0x2010 as f64));
        assert_eq!(decoded[1].value, SignalValue::Numeric(0.0));
    }

    #[test]
    fn test_bad_layout_skips_only_that_signal() {
        // Second signal extends past the declared size; first still decodes
        let ok = spec("Ok", 0, 8);
        let broken = spec("Broken", 60, 16);
        let msg = message(8, vec![ok, broken]);

        let decoded = SignalDecoder::decode_message(&msg, &[0x55, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, "Ok");
    }

    #[test]
    fn test_empty_payload() {
        let msg = message(8, vec![spec("A", 0, 8)]);
        let decoded = SignalDecoder::decode_message(&msg, &[]);
        assert_eq!(decoded[0].value, SignalValue::Numeric(0.0));
    }
}
