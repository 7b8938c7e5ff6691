//! Flush worker for coalesced live updates.
//!
//! Wakes every `interval`, drains the pending publication updates, and hands
//! non-empty batches to the broadcaster. The wait restarts once a tick is
//! done, so a slow broadcast pushes the next tick back instead of overlapping
//! with it.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use blog_core::events::{Broadcaster, CoalescingBuffer};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

/// Dependencies needed by the flush worker.
pub struct FlushWorkerDeps {
    pub buffer: Arc<CoalescingBuffer<i64, Value>>,
    pub broadcaster: Arc<dyn Broadcaster>,
    /// Event name attached to every batch.
    pub channel: &'static str,
    pub interval: Duration,
    pub stats: Arc<FlushStats>,
}

/// Counters describing the flush worker's activity.
#[derive(Default)]
pub struct FlushStats {
    ticks: AtomicU64,
    broadcasts: AtomicU64,
    failures: AtomicU64,
    events_delivered: AtomicU64,
    last_flush_at: RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time view of [`FlushStats`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushStatsSnapshot {
    pub ticks: u64,
    pub broadcasts: u64,
    pub failures: u64,
    pub events_delivered: u64,
    pub pending: usize,
    pub last_flush_at: Option<String>,
}

impl FlushStats {
    /// Timer ticks so far; each tick is exactly one drain attempt.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> u64 {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, pending: usize) -> FlushStatsSnapshot {
        let last_flush_at = *self
            .last_flush_at
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        FlushStatsSnapshot {
            ticks: self.ticks(),
            broadcasts: self.broadcasts(),
            failures: self.failures(),
            events_delivered: self.events_delivered.load(Ordering::SeqCst),
            pending,
            last_flush_at: last_flush_at.map(|at| at.to_rfc3339()),
        }
    }

    fn record_success(&self, delivered: usize) {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        self.events_delivered
            .fetch_add(delivered as u64, Ordering::SeqCst);
        *self
            .last_flush_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }
}

/// Runs the flush worker until `shutdown` flips (or its sender is dropped).
///
/// Pending updates are flushed one last time before the worker exits.
pub async fn flush_worker(deps: Arc<FlushWorkerDeps>, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(
        "Live update flush worker started ({}s interval)",
        deps.interval.as_secs_f64()
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(deps.interval) => {
                deps.stats.ticks.fetch_add(1, Ordering::SeqCst);
                flush_pending(&deps).await;
            }
            _ = shutdown.changed() => {
                flush_pending(&deps).await;
                tracing::info!("Live update flush worker shutting down");
                return;
            }
        }
    }
}

/// Drains the buffer and broadcasts the batch, if any.
///
/// Broadcaster errors and panics are logged and the batch is dropped; they
/// never reach the caller.
async fn flush_pending(deps: &FlushWorkerDeps) {
    let batch = deps.buffer.drain();
    if batch.is_empty() {
        return;
    }

    let count = batch.len();
    tracing::debug!("Flushing {} coalesced update(s) on '{}'", count, deps.channel);

    let outcome = AssertUnwindSafe(deps.broadcaster.send(deps.channel, batch))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => deps.stats.record_success(count),
        Ok(Err(e)) => {
            deps.stats.failures.fetch_add(1, Ordering::SeqCst);
            tracing::warn!("Broadcast of {} update(s) failed, batch dropped: {}", count, e);
        }
        Err(_) => {
            deps.stats.failures.fetch_add(1, Ordering::SeqCst);
            tracing::error!("Broadcaster panicked while sending {} update(s), batch dropped", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blog_core::events::RecordingBroadcaster;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    const INTERVAL: Duration = Duration::from_secs(15);

    fn deps_with(broadcaster: Arc<dyn Broadcaster>) -> Arc<FlushWorkerDeps> {
        Arc::new(FlushWorkerDeps {
            buffer: Arc::new(CoalescingBuffer::new()),
            broadcaster,
            channel: "batched_publication_updates",
            interval: INTERVAL,
            stats: Arc::new(FlushStats::default()),
        })
    }

    /// Fails on the first call, succeeds afterwards.
    struct FlakyBroadcaster {
        calls: AtomicUsize,
        inner: RecordingBroadcaster,
    }

    #[async_trait]
    impl Broadcaster for FlakyBroadcaster {
        async fn send(&self, channel: &'static str, batch: Vec<Value>) -> blog_core::Result<()> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(blog_core::Error::Broadcast("socket closed".to_string())),
                _ => self.inner.send(channel, batch).await,
            }
        }
    }

    /// Panics on the first call, succeeds afterwards.
    struct PanickyBroadcaster {
        calls: AtomicUsize,
        inner: RecordingBroadcaster,
    }

    #[async_trait]
    impl Broadcaster for PanickyBroadcaster {
        async fn send(&self, channel: &'static str, batch: Vec<Value>) -> blog_core::Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("transport blew up");
            }
            self.inner.send(channel, batch).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_ticks_do_not_broadcast() {
        let recorder = RecordingBroadcaster::new();
        let deps = deps_with(Arc::new(recorder.clone()));
        let (_tx, rx) = watch::channel(false);
        tokio::spawn(flush_worker(deps.clone(), rx));

        tokio::time::sleep(INTERVAL * 3 + Duration::from_secs(1)).await;

        assert_eq!(deps.stats.ticks(), 3);
        assert!(recorder.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_broadcasts_coalesced_batch() {
        let recorder = RecordingBroadcaster::new();
        let deps = deps_with(Arc::new(recorder.clone()));
        let (_tx, rx) = watch::channel(false);

        deps.buffer.record(42, json!({"id": 42, "title": "A"}));
        deps.buffer.record(43, json!({"id": 43, "title": "B"}));
        deps.buffer.record(42, json!({"id": 42, "title": "A2"}));
        tokio::spawn(flush_worker(deps.clone(), rx));

        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;

        let batches = recorder.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].channel, "batched_publication_updates");
        let mut payloads = batches[0].payloads.clone();
        payloads.sort_by_key(|p| p["id"].as_i64());
        assert_eq!(
            payloads,
            vec![
                json!({"id": 42, "title": "A2"}),
                json!({"id": 43, "title": "B"})
            ]
        );
        assert!(deps.buffer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_error_does_not_stop_the_loop() {
        let recorder = RecordingBroadcaster::new();
        let deps = deps_with(Arc::new(FlakyBroadcaster {
            calls: AtomicUsize::new(0),
            inner: recorder.clone(),
        }));
        let (_tx, rx) = watch::channel(false);
        tokio::spawn(flush_worker(deps.clone(), rx));

        deps.buffer.record(1, json!({"id": 1}));
        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(deps.stats.failures(), 1);

        deps.buffer.record(2, json!({"id": 2}));
        tokio::time::sleep(INTERVAL).await;

        assert_eq!(deps.stats.ticks(), 2);
        assert_eq!(recorder.batches()[0].payloads, vec![json!({"id": 2})]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcaster_panic_does_not_stop_the_loop() {
        let recorder = RecordingBroadcaster::new();
        let deps = deps_with(Arc::new(PanickyBroadcaster {
            calls: AtomicUsize::new(0),
            inner: recorder.clone(),
        }));
        let (_tx, rx) = watch::channel(false);
        tokio::spawn(flush_worker(deps.clone(), rx));

        deps.buffer.record(1, json!({"id": 1}));
        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        deps.buffer.record(2, json!({"id": 2}));
        tokio::time::sleep(INTERVAL).await;

        assert_eq!(deps.stats.failures(), 1);
        assert_eq!(deps.stats.broadcasts(), 1);
        assert_eq!(recorder.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_updates() {
        let recorder = RecordingBroadcaster::new();
        let deps = deps_with(Arc::new(recorder.clone()));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(flush_worker(deps.clone(), rx));

        deps.buffer.record(7, json!({"id": 7}));
        tx.send_replace(true);
        handle.await.unwrap();

        assert_eq!(deps.stats.ticks(), 0);
        assert_eq!(recorder.batches()[0].payloads, vec![json!({"id": 7})]);
    }

    #[test]
    fn test_snapshot_reports_counters() {
        let stats = FlushStats::default();
        stats.ticks.fetch_add(4, Ordering::SeqCst);
        stats.record_success(3);

        let snapshot = stats.snapshot(2);
        assert_eq!(snapshot.ticks, 4);
        assert_eq!(snapshot.broadcasts, 1);
        assert_eq!(snapshot.events_delivered, 3);
        assert_eq!(snapshot.pending, 2);
        assert!(snapshot.last_flush_at.is_some());
    }
}
