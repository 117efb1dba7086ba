//! Tracker diagnostic counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared between trackers and whoever reports on them.
///
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct TrackerDiagnostics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    events_recorded: AtomicU64,
    invalid_state_drops: AtomicU64,
    malformed_metadata_rejections: AtomicU64,
    handoff_drops: AtomicU64,
    batches_handed_off: AtomicU64,
}

/// Point-in-time copy of the diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub events_recorded: u64,
    pub invalid_state_drops: u64,
    pub malformed_metadata_rejections: u64,
    /// Records dropped because the delivery queue rejected their batch
    pub handoff_drops: u64,
    pub batches_handed_off: u64,
}

impl TrackerDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_event(&self) {
        self.inner.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalid_state(&self) {
        self.inner.invalid_state_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed_metadata(&self) {
        self.inner
            .malformed_metadata_rejections
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handoff(&self) {
        self.inner.batches_handed_off.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handoff_drop(&self, records: usize) {
        self.inner
            .handoff_drops
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let c = &self.inner;
        DiagnosticsSnapshot {
            events_recorded: c.events_recorded.load(Ordering::Relaxed),
            invalid_state_drops: c.invalid_state_drops.load(Ordering::Relaxed),
            malformed_metadata_rejections: c.malformed_metadata_rejections.load(Ordering::Relaxed),
            handoff_drops: c.handoff_drops.load(Ordering::Relaxed),
            batches_handed_off: c.batches_handed_off.load(Ordering::Relaxed),
        }
    }
}
