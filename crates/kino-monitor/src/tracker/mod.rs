//! Player lifecycle trackers
//!
//! A tracker is bound to at most one player at a time and turns the player's
//! lifecycle calls into telemetry records:
//!
//! ```text
//! created ──enable──► enabled ──(metadata | properties | event)*──► disable ──► created
//! ```
//!
//! Calls that arrive in the wrong state (updates while disabled, a second
//! `enable`) are handled by the configured [`InvalidStatePolicy`].
//!
//! [`InvalidStatePolicy`]: crate::config::InvalidStatePolicy

mod blocked;
mod control;
mod core;
mod diagnostics;
mod list;
mod metrics;

pub use blocked::{BlockState, BlockedSegmentTracker};
pub use control::{ControlRequest, NoopControl, PlaybackControl, PlayerBinding, RecordingControl};
pub use diagnostics::{DiagnosticsSnapshot, TrackerDiagnostics};
pub use list::TrackerList;
pub use metrics::MetricsTracker;

use crate::{
    event::MetricEvent,
    types::{Metadata, PlayerProperties},
    Result,
};

/// Lifecycle interface the player drives
pub trait Tracker: Send {
    /// Tracker name used in batches and logs
    fn name(&self) -> &'static str;

    /// Check if bound to a player
    fn is_enabled(&self) -> bool;

    /// Bind to a player and start a session
    fn enable(&mut self, binding: PlayerBinding) -> Result<()>;

    /// Replace the current media metadata
    fn update_metadata(&mut self, metadata: Metadata) -> Result<()>;

    /// Replace the last-known playback snapshot
    fn update_properties(&mut self, properties: PlayerProperties) -> Result<()>;

    /// Timestamp and enqueue a metric event without blocking
    fn receive_metric_event(&mut self, event: MetricEvent) -> Result<()>;

    /// Flush pending records, unbind and reset
    fn disable(&mut self) -> Result<()>;

    /// Hand buffered records to delivery now
    fn flush(&mut self);
}
