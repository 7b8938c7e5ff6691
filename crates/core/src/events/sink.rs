//! Producer-side entry point for live events.

use super::LiveEvent;

/// Accepts live events from request handlers once their mutation is committed.
///
/// `emit()` never blocks on clients: implementations either queue the event
/// for the next batch or hand it to an in-memory fan-out. An event that
/// cannot be delivered is logged and dropped; the request that produced it
/// has already succeeded.
pub trait LiveEventSink: Send + Sync {
    fn emit(&self, event: LiveEvent);

    /// Emits `events` in order.
    fn emit_batch(&self, events: Vec<LiveEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}
