//! Telemetry event model
//!
//! Metric events describe something that happened during playback. Trackers
//! wrap them into records carrying the session, sequence number, timestamp
//! and playback position at the time they were recorded.

use crate::{qoe::QoeBreakdown, types::SessionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metric event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricEvent {
    /// Tracker bound to a player
    SessionStarted,

    /// Tracker unbound from its player
    SessionEnded {
        position: f64,
        watch_time: f64,
    },

    /// Media item changed
    MetadataChanged {
        media_id: String,
        title: Option<String>,
    },

    /// Playback started or resumed
    PlaybackStarted {
        position: f64,
    },

    /// Playback paused
    Paused {
        position: f64,
    },

    /// Seek performed
    Seek {
        from: f64,
        to: f64,
    },

    /// Playback stalled for `duration` seconds
    Stall {
        position: f64,
        duration: f64,
    },

    /// Error occurred
    Error {
        code: String,
        message: String,
        fatal: bool,
    },

    /// Playback entered a blocked segment
    SegmentBlocked {
        start: f64,
        end: f64,
        position: f64,
    },

    /// Playback left a blocked segment
    SegmentUnblocked {
        position: f64,
    },

    /// End-of-session quality summary
    SessionSummary {
        qoe: QoeBreakdown,
    },

    /// Custom event
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

impl MetricEvent {
    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            MetricEvent::SessionStarted => "session_started",
            MetricEvent::SessionEnded { .. } => "session_ended",
            MetricEvent::MetadataChanged { .. } => "metadata_changed",
            MetricEvent::PlaybackStarted { .. } => "playback_started",
            MetricEvent::Paused { .. } => "paused",
            MetricEvent::Seek { .. } => "seek",
            MetricEvent::Stall { .. } => "stall",
            MetricEvent::Error { .. } => "error",
            MetricEvent::SegmentBlocked { .. } => "segment_blocked",
            MetricEvent::SegmentUnblocked { .. } => "segment_unblocked",
            MetricEvent::SessionSummary { .. } => "session_summary",
            MetricEvent::Custom { .. } => "custom",
        }
    }

    /// Build an error event from a code and message
    pub fn error(code: impl Into<String>, message: impl Into<String>, fatal: bool) -> Self {
        MetricEvent::Error {
            code: code.into(),
            message: message.into(),
            fatal,
        }
    }
}

/// Metric event with session metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Unique record ID
    pub id: Uuid,
    /// Session ID
    pub session_id: SessionId,
    /// Sequence number within the session, starting at 1
    pub sequence: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Playback position when recorded
    pub position: Option<f64>,
    /// Media item when recorded
    pub media_id: Option<String>,
    /// The event, serialized as a nested object
    pub event: MetricEvent,
}

/// Batch of records handed to a dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    /// Session the records belong to
    pub session_id: SessionId,
    /// Name of the tracker that produced the batch
    pub tracker: String,
    pub records: Vec<TelemetryRecord>,
}

impl TelemetryBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
