//! Pipeline configuration
//!
//! Tunables for batching, write retries, backpressure, and the timestamp
//! reconciler's reset heuristic. Defaults mirror the write options the
//! production listener ran with (batch 1000, 3 retries, exponential backoff
//! from 5s capped at 30s).

use serde::{Deserialize, Serialize};

/// Configuration for the ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of points accumulated before a flush to the sink
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Capacity of the bounded queue between the decode and write stages.
    /// Producers block when it is full - this is the backpressure bound.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Retry attempts after a failed flush before the batch is counted lost
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between flush retries, in milliseconds (doubles per
    /// attempt)
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Upper bound on the retry delay, in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Backward jump (seconds) in a relative timestamp stream that is
    /// treated as a device clock reset
    #[serde(default = "default_reset_threshold_secs")]
    pub reset_threshold_secs: f64,

    /// Dictionary lookup cache entries before a full clear
    #[serde(default = "default_message_cache_limit")]
    pub message_cache_limit: usize,
}

fn default_batch_size() -> usize {
    1000
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    5000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_reset_threshold_secs() -> f64 {
    60.0
}

fn default_message_cache_limit() -> usize {
    1000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            reset_threshold_secs: default_reset_threshold_secs(),
            message_cache_limit: default_message_cache_limit(),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the flush batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method: set the bounded queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Builder method: set the flush retry budget
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder method: set the initial retry delay in milliseconds
    pub fn with_retry_initial_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_initial_delay_ms = delay_ms;
        self
    }

    /// Builder method: set the clock-reset detection threshold in seconds
    pub fn with_reset_threshold_secs(mut self, secs: f64) -> Self {
        self.reset_threshold_secs = secs;
        self
    }
}
