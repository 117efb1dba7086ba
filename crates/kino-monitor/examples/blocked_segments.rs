//! Blocked segment example
//!
//! Plays a simulated timeline through the metrics and blocked-segment
//! trackers and prints the telemetry that reaches the dispatcher.
//!
//! Run with: cargo run -p kino-monitor --example blocked_segments

use kino_monitor::{
    tracker::{ControlRequest, RecordingControl},
    BlockedSegmentTracker, DeliveryWorker, ManualClock,
    MemoryDispatcher, Metadata, MetricEvent, MetricsTracker, MonitorConfig, PlayerBinding,
    PlayerId, PlayerProperties, TimeRange, Tracker, TrackerList,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> kino_monitor::Result<()> {
    println!("Kino Monitor - Blocked Segment Example");
    println!("======================================\n");

    let config = MonitorConfig::default();
    let sink = MemoryDispatcher::new();
    let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);
    let clock = Arc::new(ManualClock::new(1_700_000_000.0));
    let control = RecordingControl::new();

    let mut trackers = TrackerList::new()
        .with(MetricsTracker::new(config.clone(), worker.handle()).with_clock(clock.clone()))
        .with(BlockedSegmentTracker::new(config, worker.handle()).with_clock(clock.clone()));

    trackers.enable(PlayerBinding::new(
        PlayerId::new("example-player"),
        Arc::new(control.clone()),
    ))?;
    trackers.update_metadata(
        Metadata::new("episode-42")
            .with_title("Pilot")
            .with_blocked_segments(vec![TimeRange::new(10.0, 20.0), TimeRange::new(45.0, 60.0)]),
    )?;
    trackers.receive_metric_event(MetricEvent::PlaybackStarted { position: 0.0 })?;

    // One tick every 5 seconds; the player honours a seek on the next tick
    let mut position = 0.0;
    let mut handled = 0;
    while position < 70.0 {
        clock.advance(5.0);
        trackers.update_properties(PlayerProperties::at(position))?;

        let requests = control.requests();
        let seek_target = requests[handled..].iter().rev().find_map(|request| match request {
            ControlRequest::Seek { position } => Some(*position),
            ControlRequest::Pause => None,
        });
        handled = requests.len();
        position = seek_target.unwrap_or(position + 5.0);
    }

    trackers.disable()?;
    let stats = worker.shutdown().await;

    for record in sink.records().await {
        println!(
            "#{:<3} {:>14}ms  pos={:<6} {}",
            record.sequence,
            record.timestamp_ms,
            record
                .position
                .map(|p| format!("{:.1}", p))
                .unwrap_or_else(|| "-".into()),
            serde_json::to_string(&record.event)?
        );
    }

    println!("\nControl requests: {:?}", control.requests());
    println!(
        "Delivered {} records in {} batches",
        stats.records_delivered, stats.batches_delivered
    );

    Ok(())
}
