//! Pipeline orchestration
//!
//! Drives raw frames through normalize -> dictionary lookup -> timestamp
//! reconciliation -> signal decode, feeding decoded points into the batcher
//! and folding write accounting into an [`IngestionSummary`].
//!
//! The frame loop never aborts for one bad frame: malformed fields, unknown
//! CAN ids, and decode failures are counted and skipped. A call that decodes
//! zero points from non-empty input is a successful, empty result.

use crate::batcher::PointBatcher;
use crate::config::PipelineConfig;
use crate::dictionary::SignalDictionary;
use crate::frame::{self, RawFrame};
use crate::signal_decoder::SignalDecoder;
use crate::sink::{Point, PointSink};
use crate::timestamp::TimestampReconciler;
use crate::types::{DecodedReading, IngestError, IngestionSummary, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal for an in-flight ingestion call
///
/// Raising it stops the frame loop before the next frame; already-decoded
/// points are still flushed and the returned summary reflects the partial
/// run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the cancellation signal
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once the signal has been raised
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The ingestion pipeline for one logical telemetry stream
///
/// Owns the stream's timestamp reconciler; `ingest` takes `&mut self`, so
/// anchor mutation is serialized by construction. Run one pipeline per
/// source - sharing one across independent streams would cross-contaminate
/// the timestamp anchor.
pub struct Pipeline {
    dictionary: Arc<SignalDictionary>,
    sink: Arc<dyn PointSink>,
    reconciler: TimestampReconciler,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline over a dictionary and a write sink
    pub fn new(
        dictionary: Arc<SignalDictionary>,
        sink: Arc<dyn PointSink>,
        config: PipelineConfig,
    ) -> Self {
        let reconciler = TimestampReconciler::with_reset_threshold(config.reset_threshold_secs);
        Self {
            dictionary,
            sink,
            reconciler,
            config,
        }
    }

    /// Ingest a batch of raw frames
    pub fn ingest(&mut self, frames: &[RawFrame]) -> Result<IngestionSummary> {
        self.ingest_with_cancel(frames, &CancelToken::new())
    }

    /// Ingest an inbound JSON document (bare array or `messages` wrapper)
    pub fn ingest_json(&mut self, json: &str) -> Result<IngestionSummary> {
        let frames = frame::parse_frames(json)?;
        self.ingest(&frames)
    }

    /// Ingest a batch of raw frames under a cancellation token
    pub fn ingest_with_cancel(
        &mut self,
        frames: &[RawFrame],
        cancel: &CancelToken,
    ) -> Result<IngestionSummary> {
        let mut summary = IngestionSummary {
            received_frames: frames.len(),
            ..Default::default()
        };

        let batcher = PointBatcher::new(self.sink.clone(), &self.config);

        for (idx, raw) in frames.iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!(
                    "Ingestion cancelled after {} of {} frames; flushing partial batch",
                    idx,
                    frames.len()
                );
                break;
            }

            match self.process_frame(idx, raw, &batcher) {
                Ok(points) => summary.decoded_points += points,
                Err(IngestError::WriteFailure(e)) => {
                    // The write worker is gone - nothing further can be
                    // delivered, but the partial summary is still returned.
                    log::error!("Write stage failed mid-batch: {}", e);
                    summary.frame_errors += 1;
                    break;
                }
                Err(_) => summary.frame_errors += 1,
            }
        }

        let stats = batcher.close();
        summary.written_points = stats.written;
        summary.failed_points = stats.failed;

        if summary.frame_errors > 0 {
            log::warn!(
                "Processed {} frames with {} errors, generated {} points",
                summary.received_frames,
                summary.frame_errors,
                summary.decoded_points
            );
        } else {
            log::debug!(
                "Processed {} frames, generated {} points",
                summary.received_frames,
                summary.decoded_points
            );
        }

        Ok(summary)
    }

    /// Process one frame end to end; returns the number of points submitted
    fn process_frame(
        &mut self,
        idx: usize,
        raw: &RawFrame,
        batcher: &PointBatcher,
    ) -> Result<usize> {
        let canonical = frame::normalize(raw).map_err(|e| {
            log::warn!("Frame #{}: {}. Skipping.", idx + 1, e);
            e
        })?;

        // Unknown ids are frequent bus noise; the dictionary already logs
        // them at debug level.
        let message = self
            .dictionary
            .lookup_message(canonical.can_id)
            .ok_or(IngestError::UnknownMessage(canonical.can_id))?;

        let timestamp = self.reconciler.resolve(canonical.raw_timestamp);
        let can_id_hex = format!("{:#04x}", canonical.can_id);

        let signals = SignalDecoder::decode_message(&message, &canonical.payload);
        if signals.is_empty() && !message.signals.is_empty() {
            let e = IngestError::SignalDecodeFailure(format!(
                "message {} produced no decodable signals",
                message.name
            ));
            log::warn!("Frame #{}: {}. Skipping.", idx + 1, e);
            return Err(e);
        }

        let mut points = 0;
        for signal in signals {
            let reading =
                DecodedReading::from_signal(&message.name, &can_id_hex, signal, timestamp);
            batcher.submit(Point::from(reading))?;
            points += 1;
        }
        Ok(points)
    }
}
