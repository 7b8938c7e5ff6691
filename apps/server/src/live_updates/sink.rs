//! Web live event sink implementation.
//!
//! Coalesces publication changes into a buffer flushed by the background
//! worker and publishes every other live event to the event bus right away.
//! Once shutdown starts, publication changes skip the buffer and go out on
//! their own, since no later flush would pick them up.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use blog_core::events::{
    Broadcaster, CoalescingBuffer, Delivery, LiveEvent, LiveEventSink,
    BATCHED_PUBLICATION_UPDATES,
};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::flush_worker::{flush_worker, FlushStats, FlushStatsSnapshot, FlushWorkerDeps};
use crate::events::{EventBus, ServerEvent};

/// Live event sink for the web server runtime.
///
/// The sink accepts events as soon as it is created; batched updates simply
/// wait in the buffer until `start_worker()` spawns the flush worker.
pub struct WebLiveEventSink {
    event_bus: EventBus,
    broadcaster: Arc<dyn Broadcaster>,
    buffer: Arc<CoalescingBuffer<i64, Value>>,
    stats: Arc<FlushStats>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Set before the final flush. Recording holds the read side, so nothing
    /// lands in the buffer after the final drain.
    closed: RwLock<bool>,
}

impl WebLiveEventSink {
    /// Creates a sink whose batches are broadcast on `event_bus`.
    pub fn new(event_bus: EventBus, interval: Duration) -> Self {
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(event_bus.clone());
        Self::with_broadcaster(event_bus, broadcaster, interval)
    }

    /// Creates a sink that publishes immediate events on `event_bus` but hands
    /// coalesced batches to `broadcaster`.
    pub fn with_broadcaster(
        event_bus: EventBus,
        broadcaster: Arc<dyn Broadcaster>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            event_bus,
            broadcaster,
            buffer: Arc::new(CoalescingBuffer::new()),
            stats: Arc::new(FlushStats::default()),
            interval,
            shutdown_tx,
            worker: Mutex::new(None),
            closed: RwLock::new(false),
        }
    }

    /// Spawns the background flush worker.
    ///
    /// Calling this again while the worker runs, or after shutdown, is a no-op.
    pub fn start_worker(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            tracing::warn!("Live update flush worker already running");
            return;
        }
        if *self.shutdown_tx.borrow() {
            tracing::warn!("Live update sink is shut down; flush worker not started");
            return;
        }

        let deps = Arc::new(FlushWorkerDeps {
            buffer: self.buffer.clone(),
            broadcaster: self.broadcaster.clone(),
            channel: BATCHED_PUBLICATION_UPDATES,
            interval: self.interval,
            stats: self.stats.clone(),
        });

        *worker = Some(tokio::spawn(flush_worker(deps, self.shutdown_tx.subscribe())));
    }

    /// Stops the flush worker after a final flush and waits for it to exit.
    ///
    /// Publication changes emitted afterwards are published immediately as a
    /// one-element batch.
    pub async fn shutdown(&self) {
        *self.closed.write().unwrap_or_else(PoisonError::into_inner) = true;
        self.shutdown_tx.send_replace(true);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    tracing::warn!("Live update flush worker ended abnormally: {}", e);
                }
            }
            None => {
                let dropped = self.buffer.drain().len();
                if dropped > 0 {
                    tracing::warn!(
                        "Flush worker was never started; {} pending update(s) dropped",
                        dropped
                    );
                }
            }
        }
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.stats.snapshot(self.buffer.len())
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl LiveEventSink for WebLiveEventSink {
    fn emit(&self, event: LiveEvent) {
        tracing::trace!("Live event for publication {}", event.publication_id());

        if let Err(e) = event.validate() {
            tracing::warn!(
                "Dropping live event for publication {}: {}",
                event.publication_id(),
                e
            );
            return;
        }

        // A pending update must not resurrect a publication clients were told is gone.
        if let LiveEvent::PublicationDeleted { publication_id } = &event {
            if self.buffer.discard(publication_id).is_some() {
                tracing::debug!(
                    "Discarded pending update for deleted publication {}",
                    publication_id
                );
            }
        }

        match event.into_delivery() {
            Delivery::Batched { key, payload } => {
                let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
                if *closed {
                    tracing::debug!("Sink is shut down; publishing update for {} directly", key);
                    self.event_bus.publish(ServerEvent::with_payload(
                        BATCHED_PUBLICATION_UPDATES,
                        Value::Array(vec![payload]),
                    ));
                } else {
                    self.buffer.record(key, payload);
                }
            }
            Delivery::Immediate {
                name,
                room,
                payload,
            } => {
                let event = ServerEvent::with_payload(name, payload);
                let event = match room {
                    Some(room) => event.in_room(room),
                    None => event,
                };
                self.event_bus.publish(event);
            }
        }
    }
}
