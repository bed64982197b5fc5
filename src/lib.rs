//! CAN Telemetry Ingestion Core
//!
//! Decodes automotive CAN-bus telemetry frames against a DBC signal
//! dictionary, reconciles ambiguous device timestamps into absolute UTC
//! instants, and batches the decoded readings toward an injected
//! time-series sink with backpressure and bounded write retries.
//!
//! # Architecture
//!
//! The pipeline is a sequence of small stages:
//! - **Frame normalizer**: folds heterogeneous wire shapes (integer or hex
//!   string ids, list/string/absent payloads) into canonical frames
//! - **Signal dictionary**: cached message lookup over a DBC database
//! - **Timestamp reconciler**: per-stream anchoring of device-relative
//!   counters to wall-clock time, with clock-reset detection
//! - **Signal decoder**: bit extraction, scaling, and enum labeling
//! - **Point batcher**: bounded queue into a writer thread that flushes
//!   batches to the sink and retries failures with backoff
//!
//! No single malformed frame, unknown CAN id, or per-signal issue aborts an
//! ingestion call; such conditions are counted in the returned summary.
//!
//! The library does NOT:
//! - Implement a time-series store (implement [`PointSink`] for yours)
//! - Serve HTTP, watch files, or parse log-file formats
//! - Send notifications
//!
//! # Example Usage
//!
//! ```no_run
//! use can_ingest::{Pipeline, PipelineConfig, Point, PointSink, SignalDictionary};
//! use std::sync::Arc;
//!
//! struct StdoutSink;
//!
//! impl PointSink for StdoutSink {
//!     fn flush(&self, points: &[Point]) -> can_ingest::Result<()> {
//!         for point in points {
//!             println!("{}", point.to_line_protocol());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let dictionary = Arc::new(SignalDictionary::from_dbc_file("car.dbc".as_ref()).unwrap());
//! let mut pipeline = Pipeline::new(dictionary, Arc::new(StdoutSink), PipelineConfig::new());
//!
//! let summary = pipeline
//!     .ingest_json(r#"{"messages":[{"id":"0x100","data":[10,20],"timestamp":12.5}]}"#)
//!     .unwrap();
//! println!(
//!     "received={} decoded={} errors={}",
//!     summary.received_frames, summary.decoded_points, summary.frame_errors
//! );
//! ```

// Public modules
pub mod batcher;
pub mod config;
pub mod dictionary;
pub mod frame;
pub mod pipeline;
pub mod signal_decoder;
pub mod sink;
pub mod timestamp;
pub mod types;

// Re-export main types for convenience
pub use batcher::{PointBatcher, WriteStats};
pub use config::PipelineConfig;
pub use dictionary::{MessageDescriptor, SignalDictionary, SignalSpec};
pub use frame::{parse_frames, RawFrame};
pub use pipeline::{CancelToken, Pipeline};
pub use signal_decoder::SignalDecoder;
pub use sink::{Point, PointSink};
pub use timestamp::TimestampReconciler;
pub use types::{
    DecodedReading, DecodedSignal, IngestError, IngestionSummary, Result, SignalValue, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
