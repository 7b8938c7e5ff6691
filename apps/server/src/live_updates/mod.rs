//! Live updates runtime bridge for the web server.
//!
//! Receives live events via `WebLiveEventSink` and either:
//! - coalesces publication changes by publication id, flushed to every client
//!   by the background worker on a fixed interval (15 seconds by default)
//! - publishes comment, like, and deletion events to the event bus at once
//!
//! Batches go out as a single `batched_publication_updates` event carrying the
//! latest version of each changed publication.

mod flush_worker;
mod sink;

pub use flush_worker::{flush_worker, FlushStats, FlushStatsSnapshot, FlushWorkerDeps};
pub use sink::WebLiveEventSink;
