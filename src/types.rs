//! Core types for the CAN ingestion pipeline
//!
//! This module defines the data model that flows through the pipeline:
//! canonical frames, decoded signal values, the readings handed to the point
//! batcher, and the error taxonomy. The pipeline recovers from per-frame
//! conditions locally - errors here are values to count, not reasons to abort
//! an ingestion call.

use chrono::{DateTime, Utc};
use std::fmt;

/// Timestamp type used throughout the pipeline
pub type Timestamp = DateTime<Utc>;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// A CAN frame after wire-shape normalization
///
/// The inbound representation allows several encodings of the id and payload
/// (see [`crate::frame`]); this is the single canonical form the rest of the
/// pipeline consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFrame {
    /// CAN arbitration ID (11-bit or 29-bit)
    pub can_id: u32,
    /// Payload bytes as supplied - may be shorter than the message's
    /// declared length; the decoder zero-pads rather than erroring
    pub payload: Vec<u8>,
    /// Raw timestamp as received; unit and epoch are ambiguous until the
    /// reconciler resolves them
    pub raw_timestamp: f64,
}

/// Errors that can occur during ingestion
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown message: CAN ID 0x{0:X}")]
    UnknownMessage(u32),

    #[error("Signal decode failure: {0}")]
    SignalDecodeFailure(String),

    #[error("Write failure: {0}")]
    WriteFailure(String),

    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A decoded signal value
///
/// Enumerated signals carry both the raw integer and the symbolic name from
/// the DBC value table; everything else is a plain physical value. Label
/// derivation is a match over this variant, not an attribute-presence check.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    /// Physical value after scale/offset conversion
    Numeric(f64),
    /// Raw value matched a DBC value description
    Enumerated {
        /// Raw integer value before scaling
        raw: i64,
        /// Symbolic name from the value table (e.g. "OFF", "DRIVE")
        label: String,
    },
}

impl SignalValue {
    /// Physical value as f64 regardless of variant
    ///
    /// For enumerated signals this is the raw table key as a float - value
    /// tables are keyed on raw values, and the matching source convention
    /// stores the table key as the sensor reading.
    pub fn as_f64(&self) -> f64 {
        match self {
            SignalValue::Numeric(v) => *v,
            SignalValue::Enumerated { raw, .. } => *raw as f64,
        }
    }

    /// Human-readable label: enum name when available, else the
    /// stringified numeric value
    pub fn label(&self) -> String {
        match self {
            SignalValue::Numeric(v) => format!("{}", v),
            SignalValue::Enumerated { label, .. } => label.clone(),
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Numeric(v) => write!(f, "{}", v),
            SignalValue::Enumerated { raw, label } => write!(f, "{} ({})", label, raw),
        }
    }
}

/// One signal extracted from a decoded frame, before timestamping
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    /// Signal name from the DBC
    pub name: String,
    /// Decoded value
    pub value: SignalValue,
    /// Engineering unit (e.g. "km/h", "V"), if the DBC records one
    pub unit: Option<String>,
}

/// Sentinel used when the dictionary records no unit for a signal
pub const UNIT_NOT_AVAILABLE: &str = "N/A";

/// One signal observation, fully resolved and ready for the point batcher
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReading {
    /// Message name from the DBC
    pub message_name: String,
    /// Signal name from the DBC
    pub signal_name: String,
    /// Canonical hex rendering of the CAN id (e.g. "0x100")
    pub can_id_hex: String,
    /// Physical value in engineering units
    pub value: f64,
    /// Engineering unit, "N/A" when the DBC has none
    pub unit: String,
    /// Symbolic enum name when the signal is enumerated, else the
    /// stringified numeric value
    pub label: String,
    /// Absolute UTC instant from the timestamp reconciler
    pub timestamp: Timestamp,
}

impl DecodedReading {
    /// Build a reading from a decoded signal plus its frame context
    pub fn from_signal(
        message_name: &str,
        can_id_hex: &str,
        signal: DecodedSignal,
        timestamp: Timestamp,
    ) -> Self {
        let label = signal.value.label();
        DecodedReading {
            message_name: message_name.to_string(),
            signal_name: signal.name,
            can_id_hex: can_id_hex.to_string(),
            value: signal.value.as_f64(),
            unit: signal.unit.unwrap_or_else(|| UNIT_NOT_AVAILABLE.to_string()),
            label,
            timestamp,
        }
    }
}

/// Aggregate result of one ingestion call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    /// Frames submitted to the call
    pub received_frames: usize,
    /// Signal readings produced across all frames
    pub decoded_points: usize,
    /// Frames skipped for any reason (malformed, unknown id, decode failure)
    pub frame_errors: usize,
    /// Points confirmed flushed to the sink
    pub written_points: usize,
    /// Points dropped after write retries were exhausted
    pub failed_points: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_value_numeric() {
        let v = SignalValue::Numeric(42.5);
        assert_eq!(v.as_f64(), 42.5);
        assert_eq!(v.label(), "42.5");
    }

    #[test]
    fn test_signal_value_enumerated() {
        let v = SignalValue::Enumerated {
            raw: 1,
            label: "DRIVE".to_string(),
        };
        assert_eq!(v.as_f64(), 1.0);
        assert_eq!(v.label(), "DRIVE");
    }

    #[test]
    fn test_numeric_label_is_plain_number() {
        // Whole floats render without an exponent or forced decimal point
        assert_eq!(SignalValue::Numeric(10.0).label(), "10");
        assert_eq!(SignalValue::Numeric(-3.25).label(), "-3.25");
    }

    #[test]
    fn test_reading_unit_default() {
        let signal = DecodedSignal {
            name: "Ignition".to_string(),
            value: SignalValue::Numeric(1.0),
            unit: None,
        };
        let reading = DecodedReading::from_signal("Body", "0x1a0", signal, Utc::now());
        assert_eq!(reading.unit, UNIT_NOT_AVAILABLE);
        assert_eq!(reading.label, "1");
    }
}
