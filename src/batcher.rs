//! Point batching and writing
//!
//! Decoded points flow through a bounded channel into a single writer
//! thread, which accumulates them into batches and flushes to the sink.
//! The channel capacity is the backpressure bound: when the sink cannot
//! keep up, producers block on `submit` instead of buffering without limit.
//!
//! Flush failures are retried with exponential backoff; a batch that
//! exhausts its retries is counted as failed points and the pipeline keeps
//! running. Closing the batcher flushes any partial batch before the sink
//! is released.

use crate::config::PipelineConfig;
use crate::sink::{Point, PointSink};
use crate::types::{IngestError, Result};
use crossbeam_channel::{bounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Write accounting returned when the batcher closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Points confirmed flushed to the sink
    pub written: usize,
    /// Points dropped after retries were exhausted
    pub failed: usize,
}

/// Retry schedule for failed flushes
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

/// Accumulates points and writes them to the sink in bounded batches
pub struct PointBatcher {
    tx: Option<Sender<Point>>,
    worker: Option<JoinHandle<WriteStats>>,
}

impl PointBatcher {
    /// Start a batcher writing to the given sink
    pub fn new(sink: Arc<dyn PointSink>, config: &PipelineConfig) -> Self {
        let (tx, rx) = bounded::<Point>(config.queue_capacity.max(1));
        let batch_size = config.batch_size.max(1);
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms.max(1)),
        };

        let worker = thread::spawn(move || {
            let mut batch: Vec<Point> = Vec::with_capacity(batch_size);
            let mut stats = WriteStats::default();

            for point in rx.iter() {
                batch.push(point);
                if batch.len() >= batch_size {
                    flush_with_retry(sink.as_ref(), &mut batch, retry, &mut stats);
                }
            }

            // Channel disconnected - flush whatever is left before exit.
            flush_with_retry(sink.as_ref(), &mut batch, retry, &mut stats);
            stats
        });

        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Submit one point for writing
    ///
    /// Blocks while the queue is full - this is where backpressure reaches
    /// the decode stage.
    pub fn submit(&self, point: Point) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| IngestError::WriteFailure("batcher already closed".to_string()))?;
        tx.send(point)
            .map_err(|_| IngestError::WriteFailure("write worker is gone".to_string()))
    }

    /// Close the batcher: flush any partial batch and return write stats
    pub fn close(mut self) -> WriteStats {
        self.tx.take();
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or_else(|_| {
                log::error!("Write worker panicked; write stats lost");
                WriteStats::default()
            }),
            None => WriteStats::default(),
        }
    }
}

impl Drop for PointBatcher {
    fn drop(&mut self) {
        // A dropped batcher still drains and flushes - partial batches must
        // not be lost on an early return path.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Flush a batch with bounded retries and exponential backoff
fn flush_with_retry(
    sink: &dyn PointSink,
    batch: &mut Vec<Point>,
    retry: RetryPolicy,
    stats: &mut WriteStats,
) {
    if batch.is_empty() {
        return;
    }

    let mut delay = retry.initial_delay;
    for attempt in 0..=retry.max_retries {
        match sink.flush(batch) {
            Ok(()) => {
                log::debug!("Flushed {} points to sink", batch.len());
                stats.written += batch.len();
                batch.clear();
                return;
            }
            Err(e) if attempt < retry.max_retries => {
                log::warn!(
                    "Sink flush failed (attempt {}/{}): {}. Retrying in {:?}.",
                    attempt + 1,
                    retry.max_retries + 1,
                    e,
                    delay
                );
                thread::sleep(delay);
                delay = (delay * 2).min(retry.max_delay);
            }
            Err(e) => {
                log::error!(
                    "Sink flush failed for {} points after {} attempts: {}",
                    batch.len(),
                    retry.max_retries + 1,
                    e
                );
                stats.failed += batch.len();
                batch.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn point(n: usize) -> Point {
        Point {
            message_name: "Msg".to_string(),
            signal_name: format!("Sig{}", n),
            can_id_hex: "0x100".to_string(),
            sensor_reading: n as f64,
            unit: "N/A".to_string(),
            signal_label: format!("{}", n),
            timestamp: Utc::now(),
        }
    }

    fn fast_config(batch_size: usize, max_retries: u32) -> PipelineConfig {
        PipelineConfig::new()
            .with_batch_size(batch_size)
            .with_max_retries(max_retries)
            .with_retry_initial_delay_ms(1)
    }

    /// Records every flushed batch
    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<usize>>,
    }

    impl PointSink for RecordingSink {
        fn flush(&self, points: &[Point]) -> Result<()> {
            self.batches.lock().unwrap().push(points.len());
            Ok(())
        }
    }

    /// Fails the first `failures` flush attempts, then succeeds
    struct FlakySink {
        failures: usize,
        attempts: AtomicUsize,
    }

    impl PointSink for FlakySink {
        fn flush(&self, _points: &[Point]) -> Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(IngestError::WriteFailure("sink unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_batch_threshold_and_partial_flush() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = PointBatcher::new(sink.clone(), &fast_config(2, 0));

        for n in 0..5 {
            batcher.submit(point(n)).unwrap();
        }
        let stats = batcher.close();

        assert_eq!(stats, WriteStats { written: 5, failed: 0 });
        // Two full batches plus the partial flushed on close
        assert_eq!(*sink.batches.lock().unwrap(), vec![2, 2, 1]);
    }

    #[test]
    fn test_retry_then_success() {
        let sink = Arc::new(FlakySink {
            failures: 2,
            attempts: AtomicUsize::new(0),
        });
        let batcher = PointBatcher::new(sink.clone(), &fast_config(10, 3));

        batcher.submit(point(0)).unwrap();
        let stats = batcher.close();

        assert_eq!(stats, WriteStats { written: 1, failed: 0 });
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_retries_count_failed() {
        let sink = Arc::new(FlakySink {
            failures: usize::MAX,
            attempts: AtomicUsize::new(0),
        });
        let batcher = PointBatcher::new(sink.clone(), &fast_config(10, 2));

        for n in 0..3 {
            batcher.submit(point(n)).unwrap();
        }
        let stats = batcher.close();

        assert_eq!(stats, WriteStats { written: 0, failed: 3 });
        // Initial attempt plus two retries
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_empty_close() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = PointBatcher::new(sink.clone(), &fast_config(10, 0));
        let stats = batcher.close();

        assert_eq!(stats, WriteStats::default());
        assert!(sink.batches.lock().unwrap().is_empty());
    }
}
