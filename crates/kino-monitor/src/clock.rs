//! Clock and timestamp conversion
//!
//! All telemetry timestamps are integer milliseconds since the Unix epoch.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Convert seconds since the epoch to integer milliseconds.
///
/// Rounds half away from zero. NaN maps to 0 and infinities saturate.
pub fn to_milliseconds(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Convert a wall-clock time to integer milliseconds since the epoch
pub fn from_datetime(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Source of wall-clock time for trackers
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch
    fn now_seconds(&self) -> f64;

    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64 {
        to_milliseconds(self.now_seconds())
    }
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> f64 {
        let now = Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9
    }

    fn now_millis(&self) -> i64 {
        from_datetime(Utc::now())
    }
}

/// Manually driven clock for tests and scripted replays.
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(seconds: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(seconds.to_bits())),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + seconds).to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now_seconds(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}
