//! Per-session Quality of Experience aggregation
//!
//! Folds the metric events of one tracking session into a score that is
//! reported in the session summary.

use crate::event::MetricEvent;
use serde::{Deserialize, Serialize};

/// QoE (Quality of Experience) calculator
#[derive(Debug, Clone, Default)]
pub struct QoeCalculator {
    /// Session start (seconds since epoch)
    session_start: Option<f64>,
    /// Time from session start to first playback
    startup_time: Option<f64>,
    /// Total stall count
    stall_count: u32,
    /// Total stall duration
    stall_duration: f64,
    seek_count: u32,
    error_count: u32,
    fatal_error_count: u32,
}

impl QoeCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session at the given wall-clock time
    pub fn start(&mut self, now: f64) {
        *self = Self {
            session_start: Some(now),
            ..Self::default()
        };
    }

    /// Fold one event observed at `now` (seconds since epoch)
    pub fn observe(&mut self, event: &MetricEvent, now: f64) {
        match event {
            MetricEvent::PlaybackStarted { .. } => {
                if self.startup_time.is_none() {
                    if let Some(start) = self.session_start {
                        self.startup_time = Some((now - start).max(0.0));
                    }
                }
            }
            MetricEvent::Stall { duration, .. } => {
                self.stall_count += 1;
                self.stall_duration += duration.max(0.0);
            }
            MetricEvent::Seek { .. } => self.seek_count += 1,
            MetricEvent::Error { fatal, .. } => {
                self.error_count += 1;
                if *fatal {
                    self.fatal_error_count += 1;
                }
            }
            _ => {}
        }
    }

    /// Calculate QoE score (0-100)
    pub fn calculate_qoe(&self) -> f64 {
        let mut score = 100.0;

        // > 2s of startup delay starts reducing score
        if let Some(startup) = self.startup_time {
            if startup > 2.0 {
                score -= (startup - 2.0) * 5.0;
            }
        }

        // Each stall costs 10 points, each stalled second 5 more
        score -= self.stall_count as f64 * 10.0;
        score -= self.stall_duration * 5.0;

        score -= self.fatal_error_count as f64 * 20.0;

        score.clamp(0.0, 100.0)
    }

    /// Get QoE breakdown
    pub fn breakdown(&self) -> QoeBreakdown {
        QoeBreakdown {
            score: self.calculate_qoe(),
            startup_time: self.startup_time,
            stall_count: self.stall_count,
            stall_duration: self.stall_duration,
            seek_count: self.seek_count,
            error_count: self.error_count,
            fatal_error_count: self.fatal_error_count,
        }
    }
}

/// QoE score breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QoeBreakdown {
    pub score: f64,
    pub startup_time: Option<f64>,
    pub stall_count: u32,
    pub stall_duration: f64,
    pub seek_count: u32,
    pub error_count: u32,
    pub fatal_error_count: u32,
}
