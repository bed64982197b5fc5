//! Write sink contract
//!
//! Decoded readings leave the pipeline as tagged, timestamped points under a
//! single `canBus` measurement. The tag/field mapping here is the output
//! contract downstream dashboards depend on; the wire format of the sink
//! itself is the injected implementation's business.

use crate::types::{DecodedReading, Result, Timestamp};

/// Measurement name all points are written under
pub const MEASUREMENT: &str = "canBus";

/// One point ready for the time-series sink
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Tag: message name from the DBC
    pub message_name: String,
    /// Tag: signal name from the DBC
    pub signal_name: String,
    /// Tag: canonical hex CAN id
    pub can_id_hex: String,
    /// Field: physical value
    pub sensor_reading: f64,
    /// Field: engineering unit ("N/A" when absent)
    pub unit: String,
    /// Field: enum name or stringified value
    pub signal_label: String,
    /// Per-record timestamp
    pub timestamp: Timestamp,
}

impl From<DecodedReading> for Point {
    fn from(reading: DecodedReading) -> Self {
        Point {
            message_name: reading.message_name,
            signal_name: reading.signal_name,
            can_id_hex: reading.can_id_hex,
            sensor_reading: reading.value,
            unit: reading.unit,
            signal_label: reading.label,
            timestamp: reading.timestamp,
        }
    }
}

impl Point {
    /// Render the point as InfluxDB line protocol, mainly for debug logging
    /// of outbound batches
    pub fn to_line_protocol(&self) -> String {
        format!(
            "{},messageName={},signalName={},canIdHex={} sensorReading={},unit=\"{}\",signalLabel=\"{}\" {}",
            MEASUREMENT,
            escape_tag(&self.message_name),
            escape_tag(&self.signal_name),
            escape_tag(&self.can_id_hex),
            self.sensor_reading,
            escape_field(&self.unit),
            escape_field(&self.signal_label),
            self.timestamp
                .timestamp_nanos_opt()
                .unwrap_or_else(|| self.timestamp.timestamp_micros().saturating_mul(1000)),
        )
    }
}

/// Escape a tag value: spaces, commas, and equals signs
fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(' ', "\\ ")
        .replace(',', "\\,")
        .replace('=', "\\=")
}

/// Escape a string field value: backslashes and double quotes
fn escape_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A downstream time-series store accepting flushed point batches
///
/// `flush` fails on full or partial failure; the batcher retries with
/// bounded attempts and counts exhausted batches as failed points.
pub trait PointSink: Send + Sync {
    /// Write a batch of points, all or nothing
    fn flush(&self, points: &[Point]) -> Result<()>;
}
