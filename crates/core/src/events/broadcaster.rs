//! Transport seam for coalesced batches.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;

/// Fan-out channel that delivers a batch to every subscribed client.
///
/// `Ok(())` means the transport took the batch, not that a client saw it.
/// Having no subscribers is not an error.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Sends `batch` to all subscribers under the event name `channel`.
    async fn send(&self, channel: &'static str, batch: Vec<Value>) -> Result<()>;
}

/// A batch captured by [`RecordingBroadcaster`].
#[derive(Clone, Debug, PartialEq)]
pub struct SentBatch {
    pub channel: &'static str,
    pub payloads: Vec<Value>,
}

/// Keeps every batch it is asked to send, for assertions.
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    sent: Arc<Mutex<Vec<SentBatch>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected batches, oldest first.
    pub fn batches(&self) -> Vec<SentBatch> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns the number of collected batches.
    pub fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Returns true if nothing has been sent.
    pub fn is_empty(&self) -> bool {
        self.sent.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn send(&self, channel: &'static str, batch: Vec<Value>) -> Result<()> {
        self.sent.lock().unwrap().push(SentBatch {
            channel,
            payloads: batch,
        });
        Ok(())
    }
}
