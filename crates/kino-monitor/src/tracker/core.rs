//! Session state shared by all tracker implementations
//!
//! Owns the binding, the last metadata and properties snapshots, and the
//! buffer of records waiting to be handed to delivery.

use super::{diagnostics::TrackerDiagnostics, PlayerBinding};
use crate::{
    clock::Clock,
    config::{InvalidStatePolicy, MonitorConfig},
    dispatcher::DeliveryHandle,
    event::{MetricEvent, TelemetryBatch, TelemetryRecord},
    types::{Metadata, PlayerProperties, SessionId},
    Error, Result,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct ActiveSession {
    id: SessionId,
    binding: PlayerBinding,
    metadata: Option<Metadata>,
    properties: Option<PlayerProperties>,
    sequence: u64,
    buffer: Vec<TelemetryRecord>,
    last_flush_ms: i64,
    started_at: f64,
}

pub(crate) struct TrackerCore {
    name: &'static str,
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    delivery: DeliveryHandle,
    diagnostics: TrackerDiagnostics,
    session: Option<ActiveSession>,
}

impl TrackerCore {
    pub fn new(
        name: &'static str,
        config: MonitorConfig,
        clock: Arc<dyn Clock>,
        delivery: DeliveryHandle,
    ) -> Self {
        Self {
            name,
            config,
            clock,
            delivery,
            diagnostics: TrackerDiagnostics::new(),
            session: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub fn diagnostics(&self) -> &TrackerDiagnostics {
        &self.diagnostics
    }

    pub fn set_diagnostics(&mut self, diagnostics: TrackerDiagnostics) {
        self.diagnostics = diagnostics;
    }

    pub fn is_enabled(&self) -> bool {
        self.session.is_some()
    }

    fn state_name(&self) -> &'static str {
        if self.is_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    }

    /// Apply the invalid-state policy to a call that arrived in the wrong state
    fn reject(&self, operation: &'static str) -> Result<()> {
        match self.config.invalid_state_policy {
            InvalidStatePolicy::Strict => Err(Error::InvalidState {
                operation,
                state: self.state_name(),
            }),
            InvalidStatePolicy::Drop => {
                self.diagnostics.record_invalid_state();
                warn!(
                    tracker = self.name,
                    operation,
                    state = self.state_name(),
                    "Dropping lifecycle call in invalid state"
                );
                Ok(())
            }
        }
    }

    /// `Ok(true)` when enabled, otherwise the policy outcome with `false`
    pub fn check_enabled(&self, operation: &'static str) -> Result<bool> {
        if self.is_enabled() {
            Ok(true)
        } else {
            self.reject(operation).map(|_| false)
        }
    }

    /// `Ok(true)` when disabled, otherwise the policy outcome with `false`
    pub fn check_disabled(&self, operation: &'static str) -> Result<bool> {
        if self.is_enabled() {
            self.reject(operation).map(|_| false)
        } else {
            Ok(true)
        }
    }

    /// Bind to a player and open a new session
    pub fn start(&mut self, binding: PlayerBinding) -> SessionId {
        let now = self.clock.now_seconds();
        let id = SessionId::new();

        info!(
            tracker = self.name,
            session_id = %id,
            player_id = %binding.player_id,
            "Tracker enabled"
        );

        self.session = Some(ActiveSession {
            id,
            binding,
            metadata: None,
            properties: None,
            sequence: 0,
            buffer: Vec::with_capacity(self.config.batch_size),
            last_flush_ms: self.clock.now_millis(),
            started_at: now,
        });
        self.record(MetricEvent::SessionStarted);
        id
    }

    /// Flush pending records and unbind
    pub fn finish(&mut self) {
        self.flush();
        if let Some(session) = self.session.take() {
            info!(
                tracker = self.name,
                session_id = %session.id,
                player_id = %session.binding.player_id,
                records = session.sequence,
                "Tracker disabled"
            );
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn binding(&self) -> Option<&PlayerBinding> {
        self.session.as_ref().map(|s| &s.binding)
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.session.as_ref().and_then(|s| s.metadata.as_ref())
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        if let Some(session) = self.session.as_mut() {
            session.metadata = Some(metadata);
        }
    }

    pub fn properties(&self) -> Option<&PlayerProperties> {
        self.session.as_ref().and_then(|s| s.properties.as_ref())
    }

    pub fn set_properties(&mut self, properties: PlayerProperties) {
        if let Some(session) = self.session.as_mut() {
            session.properties = Some(properties);
        }
    }

    /// Last known playback position
    pub fn position(&self) -> Option<f64> {
        self.properties().map(|p| p.position)
    }

    /// Seconds since the session started
    pub fn session_age(&self) -> f64 {
        self.session
            .as_ref()
            .map(|s| (self.clock.now_seconds() - s.started_at).max(0.0))
            .unwrap_or(0.0)
    }

    /// Timestamp and buffer an event for the active session
    pub fn record(&mut self, event: MetricEvent) {
        let timestamp_ms = self.clock.now_millis();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.sequence += 1;
        let record = TelemetryRecord {
            id: Uuid::new_v4(),
            session_id: session.id,
            sequence: session.sequence,
            timestamp_ms,
            position: session.properties.as_ref().map(|p| p.position),
            media_id: session.metadata.as_ref().map(|m| m.media_id.clone()),
            event,
        };
        debug!(
            tracker = self.name,
            sequence = record.sequence,
            event = record.event.kind(),
            "Recorded event"
        );
        session.buffer.push(record);
        self.diagnostics.record_event();

        if session.buffer.len() >= self.config.batch_size {
            self.flush();
        } else {
            self.flush_if_due();
        }
    }

    /// Flush when records are waiting and the flush interval has elapsed
    /// since the last flush. Every flush restarts the interval, even an empty one.
    pub fn flush_if_due(&mut self) {
        let now = self.clock.now_millis();
        let due = self.session.as_ref().is_some_and(|s| {
            !s.buffer.is_empty()
                && now.saturating_sub(s.last_flush_ms) >= self.config.flush_interval_ms as i64
        });
        if due {
            self.flush();
        }
    }

    /// Hand buffered records to delivery without waiting
    pub fn flush(&mut self) {
        let now = self.clock.now_millis();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.last_flush_ms = now;
        if session.buffer.is_empty() {
            return;
        }

        let records = std::mem::replace(
            &mut session.buffer,
            Vec::with_capacity(self.config.batch_size),
        );
        let batch = TelemetryBatch {
            session_id: session.id,
            tracker: self.name.to_string(),
            records,
        };
        let count = batch.len();

        match self.delivery.try_deliver(batch) {
            Ok(()) => {
                self.diagnostics.record_handoff();
                debug!(tracker = self.name, records = count, "Handed off batch");
            }
            Err(e) => {
                let dropped = match &e {
                    Error::HandoffRejected { records } => *records,
                    _ => count,
                };
                self.diagnostics.record_handoff_drop(dropped);
                warn!(
                    tracker = self.name,
                    records = dropped,
                    error = %e,
                    "Delivery queue rejected batch"
                );
            }
        }
    }
}
