//! Core types for Kino Monitor

use crate::{segments::BlockedSegments, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the player instance a tracker is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open time range `[start, end)` in seconds on the media timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Range length in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Check if a position falls inside the range
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Playback state as reported by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Buffering,
    Playing,
    Paused,
    Seeking,
    Ended,
    Failed,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Seeking => write!(f, "seeking"),
            PlaybackState::Ended => write!(f, "ended"),
            PlaybackState::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of playback state at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProperties {
    /// Playback position in seconds
    pub position: f64,
    /// Playback rate (1.0 = normal speed)
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Buffered range around the position
    #[serde(default)]
    pub buffered: Option<TimeRange>,
    /// Player state
    #[serde(default)]
    pub state: PlaybackState,
}

fn default_rate() -> f64 {
    1.0
}

impl PlayerProperties {
    /// Snapshot of a playing player at the given position
    pub fn at(position: f64) -> Self {
        Self {
            position,
            rate: 1.0,
            buffered: None,
            state: PlaybackState::Playing,
        }
    }

    /// Seconds buffered ahead of the position
    pub fn buffer_ahead(&self) -> f64 {
        self.buffered
            .map(|range| (range.end - self.position).max(0.0))
            .unwrap_or(0.0)
    }
}

/// Descriptive information about the current media item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Stable media identifier
    pub media_id: String,
    /// Human-readable title
    #[serde(default)]
    pub title: Option<String>,
    /// Ranges playback must not enter, sorted and disjoint
    #[serde(default)]
    pub blocked_segments: Vec<TimeRange>,
}

impl Metadata {
    pub fn new(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            title: None,
            blocked_segments: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_blocked_segments(mut self, ranges: Vec<TimeRange>) -> Self {
        self.blocked_segments = ranges;
        self
    }

    /// Validate and index the blocked segment ranges
    pub fn blocked_index(&self) -> Result<BlockedSegments> {
        BlockedSegments::new(self.blocked_segments.clone())
    }
}
