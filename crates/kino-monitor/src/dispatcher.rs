//! Telemetry delivery
//!
//! Trackers hand finished batches to a [`DeliveryHandle`] without waiting.
//! A background [`DeliveryWorker`] task feeds them to a [`Dispatcher`],
//! retrying rejected batches a bounded number of times before dropping them.

use crate::{config::MonitorConfig, event::TelemetryBatch, Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sink receiving finalized telemetry batches
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Dispatcher name for diagnostics
    fn name(&self) -> &str;

    /// Deliver one batch. An error leaves the batch to the retry policy.
    async fn dispatch(&self, batch: &TelemetryBatch) -> Result<()>;
}

/// Dispatcher keeping delivered batches in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDispatcher {
    batches: Arc<RwLock<Vec<TelemetryBatch>>>,
    /// Number of upcoming dispatch calls to reject
    failures: Arc<AtomicU32>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` dispatch calls
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// All accepted batches in delivery order
    pub async fn batches(&self) -> Vec<TelemetryBatch> {
        self.batches.read().await.clone()
    }

    /// All accepted records in delivery order
    pub async fn records(&self) -> Vec<crate::event::TelemetryRecord> {
        self.batches
            .read()
            .await
            .iter()
            .flat_map(|batch| batch.records.iter().cloned())
            .collect()
    }

    pub async fn clear(&self) {
        self.batches.write().await.clear();
    }
}

#[async_trait]
impl Dispatcher for MemoryDispatcher {
    fn name(&self) -> &str {
        "memory"
    }

    async fn dispatch(&self, batch: &TelemetryBatch) -> Result<()> {
        let rejected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(Error::delivery(self.name(), "injected failure"));
        }

        self.batches.write().await.push(batch.clone());
        Ok(())
    }
}

/// Dispatcher writing each record as a structured log event
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    async fn dispatch(&self, batch: &TelemetryBatch) -> Result<()> {
        for record in &batch.records {
            let payload = serde_json::to_string(&record.event)?;
            info!(
                target: "kino_monitor::telemetry",
                tracker = %batch.tracker,
                session_id = %record.session_id,
                sequence = record.sequence,
                timestamp_ms = record.timestamp_ms,
                position = ?record.position,
                media_id = ?record.media_id,
                event = record.event.kind(),
                payload = %payload,
                "Telemetry record"
            );
        }
        Ok(())
    }
}

/// Delivery counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub batches_delivered: u64,
    pub records_delivered: u64,
    pub batches_dropped: u64,
    pub records_dropped: u64,
    pub retries: u64,
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    batches_delivered: AtomicU64,
    records_delivered: AtomicU64,
    batches_dropped: AtomicU64,
    records_dropped: AtomicU64,
    retries: AtomicU64,
    /// Accepted into the queue but not yet delivered or dropped
    batches_pending: AtomicU64,
    records_pending: AtomicU64,
}

impl DeliveryCounters {
    fn queued(&self, records: usize) {
        self.batches_pending.fetch_add(1, Ordering::SeqCst);
        self.records_pending.fetch_add(records as u64, Ordering::SeqCst);
    }

    fn settled(&self, records: usize) {
        self.batches_pending.fetch_sub(1, Ordering::SeqCst);
        self.records_pending.fetch_sub(records as u64, Ordering::SeqCst);
    }

    fn delivered(&self, records: usize) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.records_delivered.fetch_add(records as u64, Ordering::Relaxed);
        self.settled(records);
    }

    fn dropped(&self, records: usize) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.records_dropped.fetch_add(records as u64, Ordering::Relaxed);
        self.settled(records);
    }

    /// Count everything still pending as dropped, returning the record count
    fn drop_pending(&self) -> u64 {
        let batches = self.batches_pending.swap(0, Ordering::SeqCst);
        let records = self.records_pending.swap(0, Ordering::SeqCst);
        self.batches_dropped.fetch_add(batches, Ordering::Relaxed);
        self.records_dropped.fetch_add(records, Ordering::Relaxed);
        records
    }

    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

enum DeliveryCommand {
    Batch(TelemetryBatch),
    Drain(oneshot::Sender<()>),
    Shutdown,
}

impl DeliveryCommand {
    fn records(&self) -> usize {
        match self {
            DeliveryCommand::Batch(batch) => batch.len(),
            _ => 0,
        }
    }
}

/// Non-blocking entry point into the delivery queue
#[derive(Debug, Clone)]
pub struct DeliveryHandle {
    tx: mpsc::Sender<DeliveryCommand>,
    counters: Arc<DeliveryCounters>,
}

impl std::fmt::Debug for DeliveryCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryCommand::Batch(batch) => write!(f, "Batch({} records)", batch.len()),
            DeliveryCommand::Drain(_) => write!(f, "Drain"),
            DeliveryCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl DeliveryHandle {
    /// Queue a batch without waiting.
    ///
    /// Fails with `HandoffRejected` when the queue is full or the worker has
    /// stopped; the batch is dropped in that case.
    pub fn try_deliver(&self, batch: TelemetryBatch) -> Result<()> {
        let count = batch.len();
        self.counters.queued(count);
        self.tx
            .try_send(DeliveryCommand::Batch(batch))
            .map_err(|err| {
                self.counters.settled(count);
                let records = match &err {
                    TrySendError::Full(cmd) | TrySendError::Closed(cmd) => cmd.records(),
                };
                Error::HandoffRejected { records }
            })
    }

    /// Check if the worker has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Background task delivering batches to a dispatcher
pub struct DeliveryWorker {
    handle: DeliveryHandle,
    task: JoinHandle<()>,
    counters: Arc<DeliveryCounters>,
    shutdown_timeout: Duration,
}

impl DeliveryWorker {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(dispatcher: Arc<dyn Dispatcher>, config: &MonitorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(DeliveryCounters::default());

        let retry = RetryPolicy {
            max_retries: config.max_retries,
            delay: config.retry_delay(),
        };

        info!(
            dispatcher = dispatcher.name(),
            queue_capacity = config.queue_capacity,
            max_retries = config.max_retries,
            "Starting delivery worker"
        );

        let task = tokio::spawn(run_worker(rx, dispatcher, counters.clone(), retry));

        Self {
            handle: DeliveryHandle {
                tx,
                counters: counters.clone(),
            },
            task,
            counters,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// Handle for trackers to queue batches
    pub fn handle(&self) -> DeliveryHandle {
        self.handle.clone()
    }

    /// Current delivery counters
    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }

    /// Wait until everything queued before this call has been processed.
    ///
    /// Returns false if the timeout elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        let drained = tokio::time::timeout(timeout, async {
            self.handle
                .tx
                .send(DeliveryCommand::Drain(ack_tx))
                .await
                .is_ok()
                && ack_rx.await.is_ok()
        })
        .await;

        match drained {
            Ok(done) => done,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Delivery drain timed out");
                false
            }
        }
    }

    /// Drain pending batches and stop the worker.
    ///
    /// Bounded by the configured shutdown timeout; the task is aborted if it
    /// does not finish in time. Batches that never reached the dispatcher are
    /// counted as dropped.
    pub async fn shutdown(mut self) -> DeliveryStats {
        let timeout = self.shutdown_timeout;
        let tx = self.handle.tx.clone();
        let task = &mut self.task;

        let finished = tokio::time::timeout(timeout, async move {
            if tx.send(DeliveryCommand::Shutdown).await.is_ok() {
                let _ = task.await;
            }
        })
        .await;

        if finished.is_err() {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Delivery worker did not stop in time, aborting"
            );
            self.task.abort();
            let _ = (&mut self.task).await;
        }

        let abandoned = self.counters.drop_pending();
        if abandoned > 0 {
            error!(records = abandoned, "Dropping records still queued at shutdown");
        }

        let stats = self.counters.snapshot();
        info!(
            batches_delivered = stats.batches_delivered,
            records_delivered = stats.records_delivered,
            records_dropped = stats.records_dropped,
            "Delivery worker stopped"
        );
        stats
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

async fn run_worker(
    mut rx: mpsc::Receiver<DeliveryCommand>,
    dispatcher: Arc<dyn Dispatcher>,
    counters: Arc<DeliveryCounters>,
    retry: RetryPolicy,
) {
    while let Some(command) = rx.recv().await {
        match command {
            DeliveryCommand::Batch(batch) => {
                deliver(dispatcher.as_ref(), &batch, &counters, retry).await;
            }
            DeliveryCommand::Drain(ack) => {
                let _ = ack.send(());
            }
            DeliveryCommand::Shutdown => {
                rx.close();
                discard_remaining(&mut rx, &counters).await;
                break;
            }
        }
    }
    debug!(dispatcher = dispatcher.name(), "Delivery queue closed");
}

/// Empty a closed queue, counting batches queued after shutdown as dropped
async fn discard_remaining(
    rx: &mut mpsc::Receiver<DeliveryCommand>,
    counters: &DeliveryCounters,
) {
    while let Some(command) = rx.recv().await {
        match command {
            DeliveryCommand::Batch(batch) => {
                warn!(
                    records = batch.len(),
                    session_id = %batch.session_id,
                    "Dropping batch queued after shutdown"
                );
                counters.dropped(batch.len());
            }
            DeliveryCommand::Drain(ack) => {
                let _ = ack.send(());
            }
            DeliveryCommand::Shutdown => {}
        }
    }
}

async fn deliver(
    dispatcher: &dyn Dispatcher,
    batch: &TelemetryBatch,
    counters: &DeliveryCounters,
    retry: RetryPolicy,
) {
    let attempts = retry.max_retries + 1;

    for attempt in 1..=attempts {
        match dispatcher.dispatch(batch).await {
            Ok(()) => {
                if attempt > 1 {
                    info!(attempt, session_id = %batch.session_id, "Batch delivered after retry");
                }
                counters.delivered(batch.len());
                return;
            }
            Err(e) if attempt < attempts => {
                counters.retries.fetch_add(1, Ordering::Relaxed);
                warn!(
                    attempt,
                    error = %e,
                    retry_in_ms = retry.delay.as_millis() as u64,
                    "Batch delivery failed, retrying"
                );
                tokio::time::sleep(retry.delay).await;
            }
            Err(e) => {
                counters.dropped(batch.len());
                error!(
                    attempts,
                    error = %e,
                    code = e.error_code(),
                    records = batch.len(),
                    session_id = %batch.session_id,
                    "Dropping batch after final delivery attempt"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MetricEvent, TelemetryRecord};
    use crate::types::SessionId;
    use uuid::Uuid;

    fn batch(records: usize) -> TelemetryBatch {
        let session_id = SessionId::new();
        TelemetryBatch {
            session_id,
            tracker: "test".to_string(),
            records: (1..=records as u64)
                .map(|sequence| TelemetryRecord {
                    id: Uuid::new_v4(),
                    session_id,
                    sequence,
                    timestamp_ms: 0,
                    position: None,
                    media_id: None,
                    event: MetricEvent::SessionStarted,
                })
                .collect(),
        }
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_delivers_batches_in_order() {
        let sink = MemoryDispatcher::new();
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &fast_config());
        let handle = worker.handle();

        handle.try_deliver(batch(2)).unwrap();
        handle.try_deliver(batch(3)).unwrap();
        assert!(worker.drain(Duration::from_secs(1)).await);

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 3);
        assert_eq!(sink.records().await.len(), 5);

        let stats = worker.stats();
        assert_eq!(stats.records_delivered, 5);
        assert_eq!(stats.records_dropped, 0);
    }

    #[tokio::test]
    async fn test_retries_then_delivers_once() {
        let sink = MemoryDispatcher::new();
        sink.fail_next(2);
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &fast_config());

        worker.handle().try_deliver(batch(4)).unwrap();
        assert!(worker.drain(Duration::from_secs(1)).await);

        assert_eq!(sink.batches().await.len(), 1);
        let stats = worker.stats();
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.batches_delivered, 1);
        assert_eq!(stats.batches_dropped, 0);
    }

    #[tokio::test]
    async fn test_drops_after_max_retries() {
        let sink = MemoryDispatcher::new();
        sink.fail_next(10);
        let config = MonitorConfig {
            max_retries: 2,
            ..fast_config()
        };
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);

        worker.handle().try_deliver(batch(5)).unwrap();
        assert!(worker.drain(Duration::from_secs(1)).await);

        assert!(sink.batches().await.is_empty());
        let stats = worker.stats();
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.batches_dropped, 1);
        assert_eq!(stats.records_dropped, 5);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_handoff() {
        let sink = MemoryDispatcher::new();
        let config = MonitorConfig {
            queue_capacity: 1,
            ..fast_config()
        };
        // Worker is not polled until this test yields
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &config);
        let handle = worker.handle();

        handle.try_deliver(batch(1)).unwrap();
        let err = handle.try_deliver(batch(3)).unwrap_err();
        assert!(matches!(err, Error::HandoffRejected { records: 3 }));

        assert!(worker.drain(Duration::from_secs(1)).await);
        assert_eq!(sink.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let sink = MemoryDispatcher::new();
        let worker = DeliveryWorker::spawn(Arc::new(sink.clone()), &fast_config());
        let handle = worker.handle();

        handle.try_deliver(batch(2)).unwrap();
        let stats = worker.shutdown().await;
        assert_eq!(stats.records_delivered, 2);

        assert!(handle.is_closed());
        assert!(matches!(
            handle.try_deliver(batch(1)),
            Err(Error::HandoffRejected { records: 1 })
        ));
    }

    /// Dispatcher that takes longer than any shutdown timeout used here
    struct StalledDispatcher;

    #[async_trait]
    impl Dispatcher for StalledDispatcher {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn dispatch(&self, _batch: &TelemetryBatch) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_timeout_counts_abandoned_batches() {
        let config = MonitorConfig {
            shutdown_timeout_ms: 50,
            ..fast_config()
        };
        let worker = DeliveryWorker::spawn(Arc::new(StalledDispatcher), &config);
        let handle = worker.handle();

        handle.try_deliver(batch(1)).unwrap();
        handle.try_deliver(batch(2)).unwrap();
        handle.try_deliver(batch(4)).unwrap();

        let stats = worker.shutdown().await;
        assert_eq!(stats.records_delivered, 0);
        assert_eq!(stats.batches_dropped, 3);
        assert_eq!(stats.records_dropped, 7);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_batches_behind_shutdown_are_counted() {
        let sink = MemoryDispatcher::new();
        let counters = Arc::new(DeliveryCounters::default());
        let (tx, rx) = mpsc::channel(8);
        let handle = DeliveryHandle {
            tx,
            counters: counters.clone(),
        };

        handle.try_deliver(batch(2)).unwrap();
        handle.tx.try_send(DeliveryCommand::Shutdown).unwrap();
        handle.try_deliver(batch(3)).unwrap();

        let retry = RetryPolicy {
            max_retries: 0,
            delay: Duration::from_millis(1),
        };
        run_worker(rx, Arc::new(sink.clone()), counters.clone(), retry).await;

        assert_eq!(sink.records().await.len(), 2);
        let stats = counters.snapshot();
        assert_eq!(stats.records_delivered, 2);
        assert_eq!(stats.batches_dropped, 1);
        assert_eq!(stats.records_dropped, 3);
        assert_eq!(counters.drop_pending(), 0);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_log_dispatcher_accepts() {
        let batch = batch(2);
        assert!(LogDispatcher.dispatch(&batch).await.is_ok());
    }
}
