//! General-purpose metrics tracker
//!
//! Records every metric event the player reports, the metadata changes of
//! the session, and a QoE summary when the session ends.

use super::{core::TrackerCore, PlayerBinding, Tracker, TrackerDiagnostics};
use crate::{
    clock::{Clock, SystemClock},
    config::MonitorConfig,
    dispatcher::DeliveryHandle,
    event::MetricEvent,
    qoe::{QoeBreakdown, QoeCalculator},
    types::{Metadata, PlayerProperties, SessionId},
    Result,
};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Tracker recording player metric events
pub struct MetricsTracker {
    core: TrackerCore,
    qoe: QoeCalculator,
}

impl MetricsTracker {
    pub fn new(config: MonitorConfig, delivery: DeliveryHandle) -> Self {
        Self {
            core: TrackerCore::new("metrics", config, Arc::new(SystemClock), delivery),
            qoe: QoeCalculator::new(),
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

    pub fn session_id(&self) -> Option<SessionId> {
        self.core.session_id()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.core.metadata()
    }

    pub fn properties(&self) -> Option<&PlayerProperties> {
        self.core.properties()
    }

    /// QoE of the session so far
    pub fn qoe(&self) -> QoeBreakdown {
        self.qoe.breakdown()
    }
}

impl Tracker for MetricsTracker {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    #[instrument(skip(self), fields(tracker = "metrics"))]
    fn enable(&mut self, binding: PlayerBinding) -> Result<()> {
        if !self.core.check_disabled("enable")? {
            return Ok(());
        }
        self.qoe.start(self.core.clock().now_seconds());
        self.core.start(binding);
        Ok(())
    }

    #[instrument(skip(self, metadata), fields(tracker = "metrics", media_id = %metadata.media_id))]
    fn update_metadata(&mut self, metadata: Metadata) -> Result<()> {
        if !self.core.check_enabled("update_metadata")? {
            return Ok(());
        }
        if let Err(e) = metadata.blocked_index() {
            self.core.diagnostics().record_malformed_metadata();
            warn!(error = %e, "Rejected metadata, keeping previous");
            return Err(e);
        }

        let event = MetricEvent::MetadataChanged {
            media_id: metadata.media_id.clone(),
            title: metadata.title.clone(),
        };
        self.core.set_metadata(metadata);
        self.core.record(event);
        Ok(())
    }

    fn update_properties(&mut self, properties: PlayerProperties) -> Result<()> {
        if !self.core.check_enabled("update_properties")? {
            return Ok(());
        }
        self.core.set_properties(properties);
        self.core.flush_if_due();
        Ok(())
    }

    fn receive_metric_event(&mut self, event: MetricEvent) -> Result<()> {
        if !self.core.check_enabled("receive_metric_event")? {
            return Ok(());
        }
        self.qoe.observe(&event, self.core.clock().now_seconds());
        self.core.record(event);
        Ok(())
    }

    #[instrument(skip(self), fields(tracker = "metrics"))]
    fn disable(&mut self) -> Result<()> {
        if !self.core.check_enabled("disable")? {
            return Ok(());
        }
        let position = self.core.position().unwrap_or(0.0);
        let watch_time = self.core.session_age();

        self.core.record(MetricEvent::SessionSummary {
            qoe: self.qoe.breakdown(),
        });
        self.core.record(MetricEvent::SessionEnded {
            position,
            watch_time,
        });
        self.core.finish();
        self.qoe = QoeCalculator::new();
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
        clock::ManualClock,
        config::InvalidStatePolicy,
        dispatcher::{DeliveryWorker, MemoryDispatcher},
        types::{PlayerId, TimeRange},
        Error,
    };
    use std::time::Duration;

    fn config(policy: InvalidStatePolicy) -> MonitorConfig {
        MonitorConfig {
            invalid_state_policy: policy,
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    fn binding() -> PlayerBinding {
        PlayerBinding::detached(PlayerId::new("player-1"))
    }

    #[tokio::test]
    async fn test_session_lifecycle_records() {
        let sink = MemoryDispatcher::new();
        let config = config(InvalidStatePolicy::Strict);
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);
        let clock = ManualClock::new(1_000.0);
        let mut tracker =
            MetricsTracker::new(config, worker.handle()).with_clock(Arc::new(clock.clone()));

        tracker.enable(binding()).unwrap();
        let session_id = tracker.session_id().unwrap();
        tracker
            .update_metadata(Metadata::new("movie-1").with_title("Movie"))
            .unwrap();
        tracker.update_properties(PlayerProperties::at(3.0)).unwrap();
        clock.advance(1.5);
        tracker
            .receive_metric_event(MetricEvent::PlaybackStarted { position: 3.0 })
            .unwrap();
        clock.advance(10.0);
        tracker.disable().unwrap();
        assert!(!tracker.is_enabled());

        assert!(worker.drain(Duration::from_secs(1)).await);
        let records = sink.records().await;
        let kinds: Vec<_> = records.iter().map(|r| r.event.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "session_started",
                "metadata_changed",
                "playback_started",
                "session_summary",
                "session_ended"
            ]
        );

        assert!(records.iter().all(|r| r.session_id == session_id));
        let sequences: Vec<_> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);

        assert_eq!(records[0].timestamp_ms, 1_000_000);
        assert_eq!(records[0].media_id, None);
        assert_eq!(records[2].timestamp_ms, 1_001_500);
        assert_eq!(records[2].position, Some(3.0));
        assert_eq!(records[2].media_id.as_deref(), Some("movie-1"));

        match &records[4].event {
            MetricEvent::SessionEnded { watch_time, .. } => assert_eq!(*watch_time, 11.5),
            other => panic!("unexpected event {:?}", other),
        }
        match &records[3].event {
            MetricEvent::SessionSummary { qoe } => assert_eq!(qoe.startup_time, Some(1.5)),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_calls_while_disabled() {
        let config = config(InvalidStatePolicy::Strict);
        let worker = DeliveryWorker::spawn(Arc::new(MemoryDispatcher::new()), &config);
        let mut tracker = MetricsTracker::new(config, worker.handle());

        let err = tracker
            .receive_metric_event(MetricEvent::Paused { position: 1.0 })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                operation: "receive_metric_event",
                state: "disabled"
            }
        ));
        assert!(tracker.disable().is_err());

        tracker.enable(binding()).unwrap();
        assert!(matches!(
            tracker.enable(binding()),
            Err(Error::InvalidState { operation: "enable", .. })
        ));
    }

    #[tokio::test]
    async fn test_drop_policy_counts_invalid_calls() {
        let sink = MemoryDispatcher::new();
        let config = config(InvalidStatePolicy::Drop);
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);
        let mut tracker = MetricsTracker::new(config, worker.handle());

        tracker
            .receive_metric_event(MetricEvent::Paused { position: 1.0 })
            .unwrap();
        tracker.update_properties(PlayerProperties::at(1.0)).unwrap();
        tracker.enable(binding()).unwrap();
        let first_session = tracker.session_id();
        tracker.enable(binding()).unwrap();
        assert_eq!(tracker.session_id(), first_session);
        tracker.disable().unwrap();
        tracker.disable().unwrap();

        assert_eq!(tracker.diagnostics().snapshot().invalid_state_drops, 4);
        assert!(worker.drain(Duration::from_secs(1)).await);
        assert!(sink
            .records()
            .await
            .iter()
            .all(|r| r.event.kind() != "paused"));
    }

    #[tokio::test]
    async fn test_malformed_metadata_keeps_previous() {
        let config = config(InvalidStatePolicy::Strict);
        let worker = DeliveryWorker::spawn(Arc::new(MemoryDispatcher::new()), &config);
        let mut tracker = MetricsTracker::new(config, worker.handle());

        tracker.enable(binding()).unwrap();
        tracker.update_metadata(Metadata::new("movie-1")).unwrap();

        let bad = Metadata::new("movie-2").with_blocked_segments(vec![TimeRange::new(20.0, 10.0)]);
        let err = tracker.update_metadata(bad).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_METADATA");
        assert_eq!(tracker.metadata().unwrap().media_id, "movie-1");
        assert_eq!(
            tracker.diagnostics().snapshot().malformed_metadata_rejections,
            1
        );
    }

    #[tokio::test]
    async fn test_flushes_on_batch_size() {
        let sink = MemoryDispatcher::new();
        let config = MonitorConfig {
            batch_size: 3,
            ..config(InvalidStatePolicy::Strict)
        };
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);
        let mut tracker = MetricsTracker::new(config, worker.handle());

        tracker.enable(binding()).unwrap();
        tracker
            .receive_metric_event(MetricEvent::PlaybackStarted { position: 0.0 })
            .unwrap();
        tracker
            .receive_metric_event(MetricEvent::Paused { position: 1.0 })
            .unwrap();

        assert!(worker.drain(Duration::from_secs(1)).await);
        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[0].tracker, "metrics");
    }

    #[tokio::test]
    async fn test_flushes_on_interval_from_property_ticks() {
        let sink = MemoryDispatcher::new();
        let config = MonitorConfig {
            flush_interval_ms: 5_000,
            ..config(InvalidStatePolicy::Strict)
        };
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);
        let clock = ManualClock::new(0.0);
        let mut tracker =
            MetricsTracker::new(config, worker.handle()).with_clock(Arc::new(clock.clone()));

        tracker.enable(binding()).unwrap();
        clock.advance(4.0);
        tracker.update_properties(PlayerProperties::at(4.0)).unwrap();
        assert!(worker.drain(Duration::from_secs(1)).await);
        assert!(sink.batches().await.is_empty());

        clock.advance(1.0);
        tracker.update_properties(PlayerProperties::at(5.0)).unwrap();
        assert!(worker.drain(Duration::from_secs(1)).await);
        assert_eq!(sink.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_flush_restarts_interval() {
        let sink = MemoryDispatcher::new();
        let config = MonitorConfig {
            flush_interval_ms: 5_000,
            ..config(InvalidStatePolicy::Strict)
        };
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);
        let clock = ManualClock::new(0.0);
        let mut tracker =
            MetricsTracker::new(config, worker.handle()).with_clock(Arc::new(clock.clone()));

        tracker.enable(binding()).unwrap();
        clock.advance(4.0);
        tracker.flush();

        // Interval now runs from 4s, not from the session start
        clock.advance(2.0);
        tracker
            .receive_metric_event(MetricEvent::Paused { position: 2.0 })
            .unwrap();
        assert!(worker.drain(Duration::from_secs(1)).await);
        assert_eq!(sink.batches().await.len(), 1);

        clock.advance(3.0);
        tracker.update_properties(PlayerProperties::at(5.0)).unwrap();
        assert!(worker.drain(Duration::from_secs(1)).await);
        let batches = sink.batches().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].records[0].event.kind(), "paused");
    }

    #[tokio::test]
    async fn test_reenable_starts_new_session() {
        let config = config(InvalidStatePolicy::Strict);
        let worker = DeliveryWorker::spawn(Arc::new(MemoryDispatcher::new()), &config);
        let mut tracker = MetricsTracker::new(config, worker.handle());

        tracker.enable(binding()).unwrap();
        tracker
            .receive_metric_event(MetricEvent::Stall { position: 1.0, duration: 2.0 })
            .unwrap();
        let first = tracker.session_id().unwrap();
        tracker.disable().unwrap();
        assert!(tracker.metadata().is_none());
        assert!(tracker.properties().is_none());

        tracker.enable(binding()).unwrap();
        assert_ne!(tracker.session_id().unwrap(), first);
        assert_eq!(tracker.qoe().stall_count, 0);
    }
}
