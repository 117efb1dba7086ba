//! Scripted player sessions
//!
//! A script is the sequence of calls a player runtime would make, replayed
//! against a [`TrackerList`] of the metrics and blocked-segment trackers:
//!
//! ```json
//! {
//!   "start_time": 1700000000.0,
//!   "steps": [
//!     { "step": "enable", "player_id": "tv-1" },
//!     { "step": "metadata", "metadata": { "media_id": "ep-1", "blocked_segments": [{ "start": 10, "end": 20 }] } },
//!     { "step": "properties", "properties": { "position": 12.0 } },
//!     { "step": "event", "metric": { "event": "paused", "position": 12.0 } },
//!     { "step": "advance", "seconds": 5 },
//!     { "step": "disable" }
//!   ]
//! }
//! ```

use kino_monitor::{
    tracker::{ControlRequest, RecordingControl},
    BlockedSegmentTracker, DeliveryStats, DeliveryWorker, DiagnosticsSnapshot, ManualClock,
    MemoryDispatcher, Metadata, MetricEvent, MetricsTracker, MonitorConfig, PlayerBinding,
    PlayerId, PlayerProperties, TelemetryBatch, Tracker, TrackerDiagnostics, TrackerList,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// One player call
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Enable {
        #[serde(default = "default_player_id")]
        player_id: String,
    },
    Metadata {
        metadata: Metadata,
    },
    Properties {
        properties: PlayerProperties,
    },
    Event {
        metric: MetricEvent,
    },
    /// Move the replay clock forward
    Advance {
        seconds: f64,
    },
    Flush,
    Disable,
}

fn default_player_id() -> String {
    "replay".to_string()
}

/// Session script
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Replay clock start, seconds since the epoch
    #[serde(default)]
    pub start_time: f64,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Failed step and the error it produced
#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub step: usize,
    pub code: &'static str,
    pub message: String,
}

/// Everything a replay produced
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub batches: Vec<TelemetryBatch>,
    pub control_requests: Vec<ControlRequest>,
    pub diagnostics: DiagnosticsSnapshot,
    pub delivery: DeliveryStats,
    pub failures: Vec<StepFailure>,
}

/// Run a script through fresh trackers and collect the delivered telemetry
pub async fn run(script: &Script, config: MonitorConfig) -> ReplayReport {
    let sink = MemoryDispatcher::new();
    let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);
    let clock = Arc::new(ManualClock::new(script.start_time));
    let control = RecordingControl::new();
    let diagnostics = TrackerDiagnostics::new();

    let mut trackers = TrackerList::new()
        .with(
            MetricsTracker::new(config.clone(), worker.handle())
                .with_clock(clock.clone())
                .with_diagnostics(diagnostics.clone()),
        )
        .with(
            BlockedSegmentTracker::new(config, worker.handle())
                .with_clock(clock.clone())
                .with_diagnostics(diagnostics.clone()),
        );

    let mut failures = Vec::new();
    for (index, step) in script.steps.iter().enumerate() {
        let result = match step.clone() {
            Step::Enable { player_id } => trackers.enable(PlayerBinding::new(
                PlayerId::new(player_id),
                Arc::new(control.clone()),
            )),
            Step::Metadata { metadata } => trackers.update_metadata(metadata),
            Step::Properties { properties } => trackers.update_properties(properties),
            Step::Event { metric } => trackers.receive_metric_event(metric),
            Step::Advance { seconds } => {
                clock.advance(seconds);
                Ok(())
            }
            Step::Flush => {
                trackers.flush();
                Ok(())
            }
            Step::Disable => trackers.disable(),
        };

        if let Err(e) = result {
            warn!(step = index + 1, error = %e, "Replay step failed");
            failures.push(StepFailure {
                step: index + 1,
                code: e.error_code(),
                message: e.to_string(),
            });
        }
    }

    // Anything still buffered by a session the script never disabled
    trackers.flush();
    let delivery = worker.shutdown().await;
    info!(
        steps = script.steps.len(),
        failures = failures.len(),
        "Replay finished"
    );

    ReplayReport {
        batches: sink.batches().await,
        control_requests: control.requests(),
        diagnostics: diagnostics.snapshot(),
        delivery,
        failures,
    }
}
