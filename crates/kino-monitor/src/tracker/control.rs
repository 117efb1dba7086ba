//! Player binding and playback control

use crate::types::PlayerId;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Playback requests a tracker may issue to its player.
///
/// Requests are fire-and-forget: the tracker does not wait for them and
/// learns the outcome from later property updates.
pub trait PlaybackControl: Send + Sync {
    fn seek(&self, position: f64);
    fn pause(&self);
}

/// Control that ignores every request
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopControl;

impl PlaybackControl for NoopControl {
    fn seek(&self, _position: f64) {}
    fn pause(&self) {}
}

/// Request issued through a [`PlaybackControl`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ControlRequest {
    Seek { position: f64 },
    Pause,
}

/// Control that remembers the requests it received
#[derive(Debug, Clone, Default)]
pub struct RecordingControl {
    requests: Arc<Mutex<Vec<ControlRequest>>>,
}

impl RecordingControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ControlRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn push(&self, request: ControlRequest) {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
    }
}

impl PlaybackControl for RecordingControl {
    fn seek(&self, position: f64) {
        self.push(ControlRequest::Seek { position });
    }

    fn pause(&self) {
        self.push(ControlRequest::Pause);
    }
}

/// A tracker's binding to one player instance
#[derive(Clone)]
pub struct PlayerBinding {
    pub player_id: PlayerId,
    pub control: Arc<dyn PlaybackControl>,
}

impl PlayerBinding {
    pub fn new(player_id: PlayerId, control: Arc<dyn PlaybackControl>) -> Self {
        Self { player_id, control }
    }

    /// Binding whose playback requests go nowhere
    pub fn detached(player_id: PlayerId) -> Self {
        Self::new(player_id, Arc::new(NoopControl))
    }
}

impl std::fmt::Debug for PlayerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerBinding")
            .field("player_id", &self.player_id)
            .finish_non_exhaustive()
    }
}
