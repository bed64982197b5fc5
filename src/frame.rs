//! Frame normalization
//!
//! Inbound frames arrive in several wire shapes: the id may be an integer or
//! a decimal/`0x`-hex string, the payload may be an integer list, a
//! whitespace-separated token string, or absent entirely. This module folds
//! all of them into [`CanonicalFrame`]. Out-of-range byte values are masked
//! to 8 bits rather than rejected - upstream capture tools are noisy and a
//! stray 300 or -5 should not cost the frame.

use crate::types::{CanonicalFrame, IngestError, Result};
use serde::Deserialize;

/// A raw frame as submitted by a telemetry source
///
/// Field absence is represented, not rejected, so that one malformed frame
/// is skipped and counted instead of failing the batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFrame {
    /// CAN arbitration id: integer, decimal string, or `0x`-prefixed hex
    #[serde(default)]
    pub id: Option<CanIdField>,
    /// Payload: integer list, token string, or absent (empty payload)
    #[serde(default)]
    pub data: Option<PayloadField>,
    /// Raw timestamp; unit and epoch resolved by the reconciler
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Accepted encodings of a CAN id
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CanIdField {
    /// Plain integer id
    Int(u64),
    /// Decimal or `0x`-prefixed hex string
    Text(String),
}

/// Accepted encodings of a frame payload
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PayloadField {
    /// List of byte values; each is masked to 8 bits
    Bytes(Vec<i64>),
    /// Whitespace-separated tokens, each `0x`-hex or decimal
    Text(String),
}

/// Top-level inbound shapes: a bare array of frames, or an object with a
/// `messages` key holding one
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FrameInput {
    Wrapped { messages: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

/// Parse an inbound JSON document into raw frames
///
/// Accepts either a bare JSON array or `{"messages": [...]}` equivalently.
/// Each element is deserialized independently: an element whose fields have
/// the wrong shape becomes an empty frame that [`normalize`] later rejects,
/// so one bad frame never takes its siblings down with it.
pub fn parse_frames(json: &str) -> Result<Vec<RawFrame>> {
    let input: FrameInput = serde_json::from_str(json)
        .map_err(|e| IngestError::MalformedFrame(format!("Invalid JSON: {}", e)))?;
    let values = match input {
        FrameInput::Wrapped { messages } => messages,
        FrameInput::Bare(values) => values,
    };
    Ok(values
        .into_iter()
        .map(|value| serde_json::from_value(value).unwrap_or_default())
        .collect())
}

/// Normalize a raw frame into the canonical form
///
/// Fails with [`IngestError::MalformedFrame`] when the id is missing or
/// unparseable, a payload token is unparseable, or the timestamp is missing
/// or non-finite. Absent payload is an empty payload, not an error.
pub fn normalize(frame: &RawFrame) -> Result<CanonicalFrame> {
    let can_id = match &frame.id {
        Some(id) => parse_can_id(id)?,
        None => {
            return Err(IngestError::MalformedFrame("'id' missing".to_string()));
        }
    };

    let payload = match &frame.data {
        Some(data) => parse_payload(data)?,
        None => Vec::new(),
    };

    let raw_timestamp = match frame.timestamp {
        Some(ts) if ts.is_finite() => ts,
        Some(ts) => {
            return Err(IngestError::MalformedFrame(format!(
                "non-finite timestamp {}",
                ts
            )));
        }
        None => {
            return Err(IngestError::MalformedFrame(
                "'timestamp' missing".to_string(),
            ));
        }
    };

    Ok(CanonicalFrame {
        can_id,
        payload,
        raw_timestamp,
    })
}

/// Parse a CAN id field into an unsigned integer
fn parse_can_id(id: &CanIdField) -> Result<u32> {
    match id {
        CanIdField::Int(v) => u32::try_from(*v).map_err(|_| {
            IngestError::MalformedFrame(format!("CAN id {} out of range", v))
        }),
        CanIdField::Text(s) => {
            let s = s.trim();
            let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u32::from_str_radix(hex, 16)
            } else {
                s.parse::<u32>()
            };
            parsed.map_err(|_| {
                IngestError::MalformedFrame(format!("unparseable CAN id {:?}", s))
            })
        }
    }
}

/// Parse a payload field into bytes, masking each value to 8 bits
fn parse_payload(data: &PayloadField) -> Result<Vec<u8>> {
    match data {
        PayloadField::Bytes(values) => {
            Ok(values.iter().map(|v| (v & 0xFF) as u8).collect())
        }
        PayloadField::Text(s) => s
            .split_whitespace()
            .map(parse_byte_token)
            .collect::<Result<Vec<u8>>>(),
    }
}

/// Parse one payload token: `0x`-prefixed hex, otherwise decimal
fn parse_byte_token(token: &str) -> Result<u8> {
    let parsed = if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16)
    } else {
        token.parse::<i64>()
    };
    parsed
        .map(|v| (v & 0xFF) as u8)
        .map_err(|_| IngestError::MalformedFrame(format!("unparseable data byte {:?}", token)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: CanIdField, data: Option<PayloadField>) -> RawFrame {
        RawFrame {
            id: Some(id),
            data,
            timestamp: Some(1.0),
        }
    }

    #[test]
    fn test_id_formats() {
        let f = frame(CanIdField::Int(256), None);
        assert_eq!(normalize(&f).unwrap().can_id, 256);

        let f = frame(CanIdField::Text("0x100".to_string()), None);
        assert_eq!(normalize(&f).unwrap().can_id, 256);

        let f = frame(CanIdField::Text("26".to_string()), None);
        assert_eq!(normalize(&f).unwrap().can_id, 26);
    }

    #[test]
    fn test_bad_id_is_malformed() {
        let f = frame(CanIdField::Text("zebra".to_string()), None);
        assert!(matches!(
            normalize(&f),
            Err(IngestError::MalformedFrame(_))
        ));

        let missing = RawFrame {
            id: None,
            data: None,
            timestamp: Some(1.0),
        };
        assert!(matches!(
            normalize(&missing),
            Err(IngestError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_list_and_string_payloads_agree() {
        // Round-trip property: same bytes regardless of encoding
        let as_list = frame(
            CanIdField::Int(1),
            Some(PayloadField::Bytes(vec![10, 255, 0])),
        );
        let as_decimal = frame(
            CanIdField::Int(1),
            Some(PayloadField::Text("10 255 0".to_string())),
        );
        let as_hex = frame(
            CanIdField::Int(1),
            Some(PayloadField::Text("0x0A 0xFF 0x00".to_string())),
        );

        let expected = vec![0x0A, 0xFF, 0x00];
        assert_eq!(normalize(&as_list).unwrap().payload, expected);
        assert_eq!(normalize(&as_decimal).unwrap().payload, expected);
        assert_eq!(normalize(&as_hex).unwrap().payload, expected);
    }

    #[test]
    fn test_byte_masking() {
        // 300 & 0xFF = 0x2C, -5 & 0xFF = 0xFB
        let f = frame(CanIdField::Int(1), Some(PayloadField::Bytes(vec![300, -5])));
        assert_eq!(normalize(&f).unwrap().payload, vec![0x2C, 0xFB]);
    }

    #[test]
    fn test_absent_payload_is_empty() {
        let f = frame(CanIdField::Int(1), None);
        assert_eq!(normalize(&f).unwrap().payload, Vec::<u8>::new());
    }

    #[test]
    fn test_bad_token_is_malformed() {
        let f = frame(
            CanIdField::Int(1),
            Some(PayloadField::Text("10 frog".to_string())),
        );
        assert!(matches!(
            normalize(&f),
            Err(IngestError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_missing_timestamp_is_malformed() {
        let f = RawFrame {
            id: Some(CanIdField::Int(1)),
            data: None,
            timestamp: None,
        };
        assert!(matches!(
            normalize(&f),
            Err(IngestError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_parse_frames_both_shapes() {
        let bare = r#"[{"id": "0x100", "data": [1, 2], "timestamp": 5.0}]"#;
        let wrapped = r#"{"messages": [{"id": "0x100", "data": [1, 2], "timestamp": 5.0}]}"#;

        let a = parse_frames(bare).unwrap();
        let b = parse_frames(wrapped).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(
            normalize(&a[0]).unwrap(),
            normalize(&b[0]).unwrap()
        );
    }

    #[test]
    fn test_parse_frames_null_data() {
        let json = r#"[{"id": 1, "data": null, "timestamp": 5.0}]"#;
        let frames = parse_frames(json).unwrap();
        assert_eq!(normalize(&frames[0]).unwrap().payload, Vec::<u8>::new());
    }

    #[test]
    fn test_parse_frames_invalid_json() {
        assert!(parse_frames("{not json").is_err());
    }

    #[test]
    fn test_ill_typed_frame_only_costs_itself() {
        let json = r#"[
            {"id": {"bogus": 1}, "data": [1], "timestamp": 5.0},
            {"id": "0x100", "data": [1, 2], "timestamp": 5.0}
        ]"#;
        let frames = parse_frames(json).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            normalize(&frames[0]),
            Err(IngestError::MalformedFrame(_))
        ));
        let good = normalize(&frames[1]).unwrap();
        assert_eq!(good.can_id, 0x100);
        assert_eq!(good.payload, vec![1, 2]);
    }

    #[test]
    fn test_non_object_element_only_costs_itself() {
        let json = r#"[42, {"id": 1, "data": [9], "timestamp": 1.0}]"#;
        let frames = parse_frames(json).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(normalize(&frames[0]).is_err());
        assert_eq!(normalize(&frames[1]).unwrap().payload, vec![9]);
    }
}
