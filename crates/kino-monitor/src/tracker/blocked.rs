//! Blocked segment tracker
//!
//! Watches the playback position against the blocked ranges of the current
//! media item. Entering a range records `segment_blocked` and asks the player
//! to seek past it (or pause); leaving it records `segment_unblocked`.

use super::{core::TrackerCore, PlayerBinding, Tracker, TrackerDiagnostics};
use crate::{
    clock::{Clock, SystemClock},
    config::{BlockAction, MonitorConfig},
    dispatcher::DeliveryHandle,
    event::MetricEvent,
    segments::BlockedSegments,
    types::{Metadata, PlayerProperties, TimeRange},
    Result,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Whether playback currently sits inside a blocked range
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BlockState {
    #[default]
    Unblocked,
    Blocked(TimeRange),
}

impl BlockState {
    pub fn is_blocked(&self) -> bool {
        matches!(self, BlockState::Blocked(_))
    }
}

impl std::fmt::Display for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockState::Unblocked => write!(f, "unblocked"),
            BlockState::Blocked(range) => write!(f, "blocked {}", range),
        }
    }
}

/// Tracker enforcing blocked segments
pub struct BlockedSegmentTracker {
    core: TrackerCore,
    segments: BlockedSegments,
    state: BlockState,
}

impl BlockedSegmentTracker {
    pub fn new(config: MonitorConfig, delivery: DeliveryHandle) -> Self {
        Self {
            core: TrackerCore::new("blocked_segments", config, Arc::new(SystemClock), delivery),
            segments: BlockedSegments::empty(),
            state: BlockState::Unblocked,
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.core.set_clock(clock);
        self
    }

    /// Report into shared diagnostic counters
    pub fn with_diagnostics(mut self, diagnostics: TrackerDiagnostics) -> Self {
        self.core.set_diagnostics(diagnostics);
        self
    }

    pub fn diagnostics(&self) -> &TrackerDiagnostics {
        self.core.diagnostics()
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    /// Blocked ranges of the active metadata
    pub fn segments(&self) -> &BlockedSegments {
        &self.segments
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.core.metadata()
    }

    fn enter(&mut self, range: TimeRange, position: f64) {
        self.state = BlockState::Blocked(range);
        self.core.record(MetricEvent::SegmentBlocked {
            start: range.start,
            end: range.end,
            position,
        });

        let action = self.core.config().block_action;
        if let Some(binding) = self.core.binding() {
            match action {
                BlockAction::SeekPast => binding.control.seek(range.end),
                BlockAction::Pause => binding.control.pause(),
            }
        }
        info!(
            range = %range,
            position,
            action = ?action,
            "Playback entered blocked segment"
        );
    }

    fn leave(&mut self, position: f64) {
        if let BlockState::Blocked(range) = self.state {
            debug!(range = %range, position, "Playback left blocked segment");
        }
        self.state = BlockState::Unblocked;
        self.core.record(MetricEvent::SegmentUnblocked { position });
    }
}

impl Tracker for BlockedSegmentTracker {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    #[instrument(skip(self), fields(tracker = "blocked_segments"))]
    fn enable(&mut self, binding: PlayerBinding) -> Result<()> {
        if !self.core.check_disabled("enable")? {
            return Ok(());
        }
        self.segments = BlockedSegments::empty();
        self.state = BlockState::Unblocked;
        self.core.start(binding);
        Ok(())
    }

    #[instrument(skip(self, metadata), fields(tracker = "blocked_segments", media_id = %metadata.media_id))]
    fn update_metadata(&mut self, metadata: Metadata) -> Result<()> {
        if !self.core.check_enabled("update_metadata")? {
            return Ok(());
        }
        let segments = match metadata.blocked_index() {
            Ok(segments) => segments,
            Err(e) => {
                self.core.diagnostics().record_malformed_metadata();
                warn!(error = %e, "Rejected blocked segments, keeping previous");
                return Err(e);
            }
        };

        if self.state.is_blocked() {
            let position = self.core.position().unwrap_or(0.0);
            self.leave(position);
        }
        debug!(
            segments = segments.len(),
            blocked_seconds = segments.total_duration(),
            "Blocked segments updated"
        );
        self.segments = segments;
        self.core.set_metadata(metadata);
        Ok(())
    }

    fn update_properties(&mut self, properties: PlayerProperties) -> Result<()> {
        if !self.core.check_enabled("update_properties")? {
            return Ok(());
        }
        let position = properties.position;
        self.core.set_properties(properties);

        let hit = self.segments.find(position).copied();
        match (self.state, hit) {
            (BlockState::Unblocked, Some(range)) => self.enter(range, position),
            (BlockState::Blocked(current), Some(range)) if current != range => {
                self.leave(position);
                self.enter(range, position);
            }
            (BlockState::Blocked(_), None) => self.leave(position),
            _ => {}
        }

        self.core.flush_if_due();
        Ok(())
    }

    fn receive_metric_event(&mut self, event: MetricEvent) -> Result<()> {
        if !self.core.check_enabled("receive_metric_event")? {
            return Ok(());
        }
        // Player events belong to the metrics tracker; block state only follows properties.
        debug!(event = event.kind(), "Ignoring metric event");
        Ok(())
    }

    #[instrument(skip(self), fields(tracker = "blocked_segments"))]
    fn disable(&mut self) -> Result<()> {
        if !self.core.check_enabled("disable")? {
            return Ok(());
        }
        let position = self.core.position().unwrap_or(0.0);
        let watch_time = self.core.session_age();
        self.core.record(MetricEvent::SessionEnded {
            position,
            watch_time,
        });
        self.core.finish();
        self.segments = BlockedSegments::empty();
        self.state = BlockState::Unblocked;
        Ok(())
    }

    fn flush(&mut self) {
        self.core.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::InvalidStatePolicy,
        dispatcher::{DeliveryWorker, MemoryDispatcher},
        tracker::{ControlRequest, RecordingControl},
        types::PlayerId,
    };
    use std::time::Duration;

    struct Fixture {
        tracker: BlockedSegmentTracker,
        control: RecordingControl,
        sink: MemoryDispatcher,
        worker: DeliveryWorker,
    }

    fn fixture(action: BlockAction) -> Fixture {
        let config = MonitorConfig {
            invalid_state_policy: InvalidStatePolicy::Strict,
            block_action: action,
            ..Default::default()
        };
        let sink = MemoryDispatcher::new();
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);
        let control = RecordingControl::new();
        let mut tracker = BlockedSegmentTracker::new(config, worker.handle());
        tracker
            .enable(PlayerBinding::new(
                PlayerId::new("player-1"),
                Arc::new(control.clone()),
            ))
            .unwrap();
        Fixture {
            tracker,
            control,
            sink,
            worker,
        }
    }

    fn metadata(ranges: &[(f64, f64)]) -> Metadata {
        Metadata::new("movie-1").with_blocked_segments(
            ranges
                .iter()
                .map(|&(start, end)| TimeRange::new(start, end))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_block_state_sequence() {
        let mut f = fixture(BlockAction::SeekPast);
        f.tracker.update_metadata(metadata(&[(10.0, 20.0)])).unwrap();

        let states: Vec<bool> = [5.0, 10.0, 15.0, 20.0, 25.0]
            .into_iter()
            .map(|position| {
                f.tracker
                    .update_properties(PlayerProperties::at(position))
                    .unwrap();
                f.tracker.state().is_blocked()
            })
            .collect();
        assert_eq!(states, vec![false, true, true, false, false]);

        // One request per entry, not per tick inside the range
        assert_eq!(
            f.control.requests(),
            vec![ControlRequest::Seek { position: 20.0 }]
        );

        f.tracker.disable().unwrap();
        assert!(f.worker.drain(Duration::from_secs(1)).await);
        let kinds: Vec<_> = f.sink.records().await.iter().map(|r| r.event.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "session_started",
                "segment_blocked",
                "segment_unblocked",
                "session_ended"
            ]
        );
    }

    #[tokio::test]
    async fn test_pause_action() {
        let mut f = fixture(BlockAction::Pause);
        f.tracker.update_metadata(metadata(&[(0.0, 30.0)])).unwrap();
        f.tracker.update_properties(PlayerProperties::at(0.0)).unwrap();
        assert_eq!(f.control.requests(), vec![ControlRequest::Pause]);
    }

    #[tokio::test]
    async fn test_jump_between_ranges() {
        let mut f = fixture(BlockAction::SeekPast);
        f.tracker
            .update_metadata(metadata(&[(10.0, 20.0), (20.0, 30.0)]))
            .unwrap();

        f.tracker.update_properties(PlayerProperties::at(15.0)).unwrap();
        f.tracker.update_properties(PlayerProperties::at(20.0)).unwrap();
        assert_eq!(
            f.tracker.state(),
            BlockState::Blocked(TimeRange::new(20.0, 30.0))
        );
        assert_eq!(
            f.control.requests(),
            vec![
                ControlRequest::Seek { position: 20.0 },
                ControlRequest::Seek { position: 30.0 }
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_metadata_keeps_previous_segments() {
        let mut f = fixture(BlockAction::SeekPast);
        f.tracker.update_metadata(metadata(&[(10.0, 20.0)])).unwrap();

        assert!(f.tracker.update_metadata(metadata(&[(20.0, 10.0)])).is_err());
        assert!(f
            .tracker
            .update_metadata(metadata(&[(10.0, 20.0), (15.0, 25.0)]))
            .is_err());

        assert_eq!(f.tracker.segments().ranges(), &[TimeRange::new(10.0, 20.0)]);
        f.tracker.update_properties(PlayerProperties::at(12.0)).unwrap();
        assert!(f.tracker.state().is_blocked());
        assert_eq!(
            f.tracker.diagnostics().snapshot().malformed_metadata_rejections,
            2
        );
    }

    #[tokio::test]
    async fn test_metadata_change_while_blocked_unblocks() {
        let mut f = fixture(BlockAction::SeekPast);
        f.tracker.update_metadata(metadata(&[(10.0, 20.0)])).unwrap();
        f.tracker.update_properties(PlayerProperties::at(12.0)).unwrap();
        assert!(f.tracker.state().is_blocked());

        f.tracker.update_metadata(metadata(&[])).unwrap();
        assert_eq!(f.tracker.state(), BlockState::Unblocked);
        f.tracker.update_properties(PlayerProperties::at(12.0)).unwrap();
        assert_eq!(f.tracker.state(), BlockState::Unblocked);
    }

    #[tokio::test]
    async fn test_no_metadata_never_blocks() {
        let mut f = fixture(BlockAction::SeekPast);
        f.tracker.update_properties(PlayerProperties::at(15.0)).unwrap();
        assert_eq!(f.tracker.state(), BlockState::Unblocked);
        assert!(f.control.requests().is_empty());
    }

    #[tokio::test]
    async fn test_disable_resets_segments() {
        let mut f = fixture(BlockAction::SeekPast);
        f.tracker.update_metadata(metadata(&[(10.0, 20.0)])).unwrap();
        f.tracker.update_properties(PlayerProperties::at(15.0)).unwrap();
        f.tracker.disable().unwrap();

        assert!(f.tracker.segments().is_empty());
        assert_eq!(f.tracker.state(), BlockState::Unblocked);
        assert!(f
            .tracker
            .update_properties(PlayerProperties::at(15.0))
            .is_err());
    }
}
