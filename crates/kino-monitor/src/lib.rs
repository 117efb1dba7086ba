//! Kino Monitor - Player Event Telemetry for Kino
//!
//! This crate turns player lifecycle callbacks into timestamped telemetry:
//! - Tracker lifecycle (enable, metadata, properties, events, disable)
//! - Blocked segment enforcement (ads, geo-restricted ranges)
//! - Per-session QoE aggregation
//! - Batched, non-blocking hand-off to a background delivery worker
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Kino Monitor                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   Player runtime ──► TrackerList                                │
//! │                        │                                        │
//! │          ┌─────────────┴──────────────┐                         │
//! │   ┌──────┴───────┐          ┌─────────┴────────┐                │
//! │   │   Metrics    │          │  BlockedSegment  │──► Playback    │
//! │   │   Tracker    │          │     Tracker      │    Control     │
//! │   └──────┬───────┘          └─────────┬────────┘                │
//! │          └──────────┬─────────────────┘                         │
//! │              ┌──────┴──────┐   try_send   ┌──────────────┐      │
//! │              │   Session   │─────────────►│   Delivery   │      │
//! │              │   Buffer    │              │    Worker    │      │
//! │              └─────────────┘              └──────┬───────┘      │
//! │                                                  │              │
//! │                                           ┌──────┴───────┐      │
//! │                                           │  Dispatcher  │      │
//! │                                           └──────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod qoe;
pub mod segments;
pub mod tracker;
pub mod types;

pub use clock::{to_milliseconds, Clock, ManualClock, SystemClock};
pub use config::{BlockAction, InvalidStatePolicy, MonitorConfig};
pub use dispatcher::{
    DeliveryHandle, DeliveryStats, DeliveryWorker, Dispatcher, LogDispatcher, MemoryDispatcher,
};
pub use error::{Error, Result};
pub use event::{MetricEvent, TelemetryBatch, TelemetryRecord};
pub use qoe::{QoeBreakdown, QoeCalculator};
pub use segments::BlockedSegments;
pub use tracker::{
    BlockState, BlockedSegmentTracker, DiagnosticsSnapshot, MetricsTracker, PlaybackControl,
    PlayerBinding, Tracker, TrackerDiagnostics, TrackerList,
};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the monitor library
pub fn init() {
    tracing::info!(version = VERSION, "Kino Monitor initialized");
}
