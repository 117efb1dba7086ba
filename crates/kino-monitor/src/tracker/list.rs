//! Ordered tracker fan-out

use super::{PlayerBinding, Tracker};
use crate::{
    event::MetricEvent,
    types::{Metadata, PlayerProperties},
    Result,
};
use tracing::warn;

/// Ordered list of trackers the player notifies as one.
///
/// Every call reaches every tracker in order. A failing tracker does not
/// stop the others; the first error is returned once all were notified.
#[derive(Default)]
pub struct TrackerList {
    trackers: Vec<Box<dyn Tracker>>,
}

impl TrackerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tracker: impl Tracker + 'static) {
        self.trackers.push(Box::new(tracker));
    }

    pub fn with(mut self, tracker: impl Tracker + 'static) -> Self {
        self.push(tracker);
        self
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Names of the trackers in notification order
    pub fn names(&self) -> Vec<&'static str> {
        self.trackers.iter().map(|t| t.name()).collect()
    }

    fn notify_all(
        &mut self,
        operation: &'static str,
        mut call: impl FnMut(&mut dyn Tracker) -> Result<()>,
    ) -> Result<()> {
        let mut first_error = None;
        for tracker in self.trackers.iter_mut() {
            if let Err(e) = call(tracker.as_mut()) {
                warn!(
                    tracker = tracker.name(),
                    operation,
                    error = %e,
                    "Tracker call failed"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Tracker for TrackerList {
    fn name(&self) -> &'static str {
        "tracker_list"
    }

    fn is_enabled(&self) -> bool {
        self.trackers.iter().any(|t| t.is_enabled())
    }

    fn enable(&mut self, binding: PlayerBinding) -> Result<()> {
        self.notify_all("enable", |t| t.enable(binding.clone()))
    }

    fn update_metadata(&mut self, metadata: Metadata) -> Result<()> {
        self.notify_all("update_metadata", |t| t.update_metadata(metadata.clone()))
    }

    fn update_properties(&mut self, properties: PlayerProperties) -> Result<()> {
        self.notify_all("update_properties", |t| {
            t.update_properties(properties.clone())
        })
    }

    fn receive_metric_event(&mut self, event: MetricEvent) -> Result<()> {
        self.notify_all("receive_metric_event", |t| {
            t.receive_metric_event(event.clone())
        })
    }

    fn disable(&mut self) -> Result<()> {
        self.notify_all("disable", |t| t.disable())
    }

    fn flush(&mut self) {
        for tracker in self.trackers.iter_mut() {
            tracker.flush();
        }
    }
}
