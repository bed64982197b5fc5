//! Timestamp reconciliation
//!
//! Telemetry sources report either true wall-clock epoch values or
//! device-relative counters (e.g. milliseconds since boot), in seconds or
//! milliseconds, and may restart mid-session without the ingestion service
//! restarting. The reconciler folds all of that into one absolute UTC
//! instant per frame, keeping points roughly chronological and clustered
//! near "now" so live dashboards stay usable even when the device has no
//! real-time clock.
//!
//! The heuristic cannot distinguish "device rebooted" from "large backward
//! clock jump"; the reset threshold is the tunable tie-break.

use crate::types::Timestamp;
use chrono::{DateTime, Duration, Utc};

/// Values above this are absolute milliseconds since the Unix epoch
/// (2001-01-01 in epoch milliseconds)
pub const EPOCH_MS_2001: f64 = 978_307_200_000.0;

/// Values above this (and below [`EPOCH_MS_2001`]) are absolute seconds
/// since the Unix epoch (2000-01-01 in epoch seconds)
pub const EPOCH_SECS_2000: f64 = 946_684_800.0;

/// Relative values above this are milliseconds, not seconds
pub const RELATIVE_MS_THRESHOLD: f64 = 1_000_000.0;

/// Default backward jump (seconds) treated as a device clock reset
pub const DEFAULT_RESET_THRESHOLD_SECS: f64 = 60.0;

/// Anchor pairing a device-relative raw value with the wall-clock instant
/// at which it was observed
#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    /// Raw device-relative value at the moment of anchoring
    raw: f64,
    /// Wall-clock instant captured when anchoring occurred
    wall: Timestamp,
    /// Most recent raw value seen, for reset detection
    last_raw: f64,
}

/// Stateful converter from raw frame timestamps to absolute UTC instants
///
/// One instance per logical ingestion stream. The anchor is mutable state;
/// callers that run concurrent streams need one reconciler each - a shared
/// anchor across sources would cross-contaminate reset detection.
#[derive(Debug, Clone)]
pub struct TimestampReconciler {
    reset_threshold_secs: f64,
    anchor: Option<Anchor>,
}

impl TimestampReconciler {
    /// Create a reconciler with the default reset threshold
    pub fn new() -> Self {
        Self::with_reset_threshold(DEFAULT_RESET_THRESHOLD_SECS)
    }

    /// Create a reconciler with a custom reset threshold in seconds
    pub fn with_reset_threshold(reset_threshold_secs: f64) -> Self {
        Self {
            reset_threshold_secs,
            anchor: None,
        }
    }

    /// Resolve a raw timestamp against the current wall clock
    pub fn resolve(&mut self, raw: f64) -> Timestamp {
        self.resolve_at(raw, Utc::now())
    }

    /// Resolve a raw timestamp with an explicit wall-clock reading
    ///
    /// Split out from [`resolve`](Self::resolve) so tests can pin the clock.
    pub fn resolve_at(&mut self, raw: f64, now: Timestamp) -> Timestamp {
        // Absolute timestamps convert directly and never touch the anchor.
        if raw > EPOCH_MS_2001 {
            log::debug!("Timestamp {} interpreted as absolute milliseconds", raw);
            return epoch_secs_to_datetime(raw / 1000.0).unwrap_or(now);
        }
        if raw > EPOCH_SECS_2000 {
            log::debug!("Timestamp {} interpreted as absolute seconds", raw);
            return epoch_secs_to_datetime(raw).unwrap_or(now);
        }

        // Relative timestamp - disambiguate its unit before anchoring.
        let rel = if raw > RELATIVE_MS_THRESHOLD {
            log::debug!("Relative timestamp {} interpreted as milliseconds", raw);
            raw / 1000.0
        } else {
            raw
        };

        let anchor = match self.anchor.as_mut() {
            None => {
                log::debug!(
                    "Anchoring relative timestamps: wall={}, device_ts={}",
                    now,
                    rel
                );
                self.anchor = Some(Anchor {
                    raw: rel,
                    wall: now,
                    last_raw: rel,
                });
                return now;
            }
            Some(anchor) => anchor,
        };

        // Device clock reset: a large backward jump in the raw counter.
        if rel < anchor.last_raw && (anchor.last_raw - rel) > self.reset_threshold_secs {
            log::debug!(
                "Relative timestamp reset detected: old_ts={}, new_ts={}. Re-anchoring.",
                anchor.last_raw,
                rel
            );
            anchor.wall = now;
            anchor.raw = rel;
        }
        anchor.last_raw = rel;

        let elapsed = rel - anchor.raw;
        if elapsed < 0.0 {
            // Backward but below the reset threshold. Never emit a
            // negative-offset instant: re-anchor on a significant jump,
            // otherwise hold at the anchor without advancing.
            if elapsed.abs() > self.reset_threshold_secs / 2.0 {
                log::debug!(
                    "Re-anchoring on negative jump of {}s: wall={}, device_ts={}",
                    elapsed,
                    now,
                    rel
                );
                anchor.wall = now;
                anchor.raw = rel;
            }
            return anchor.wall;
        }

        // Timestamp precision on an unrepresentable edge case matters less
        // than keeping the pipeline alive - fall back to "now".
        anchor
            .wall
            .checked_add_signed(Duration::microseconds((elapsed * 1e6).round() as i64))
            .unwrap_or(now)
    }

    /// True once a relative-timestamp anchor has been established
    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }
}

impl Default for TimestampReconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert fractional epoch seconds to a UTC instant
///
/// Goes through microseconds so that integral-millisecond inputs survive
/// the f64 round trip exactly.
fn epoch_secs_to_datetime(secs: f64) -> Option<Timestamp> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((secs * 1e6).round() as i64)
}
