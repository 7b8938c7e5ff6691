//! Coalescing event buffer.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Pending events keyed by entity, last write wins.
///
/// Producers call [`record`](Self::record) from any thread; a single flusher
/// calls [`drain`](Self::drain) on a timer. Both take the same lock and hold it
/// only for a map insert or a map swap, so producers never wait behind the
/// flusher's network I/O.
///
/// Ordering across different keys is not preserved in a drained batch.
#[derive(Debug)]
pub struct CoalescingBuffer<K, V> {
    pending: Mutex<HashMap<K, V>>,
}

impl<K, V> CoalescingBuffer<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Records the latest payload for `key`, replacing any pending one.
    pub fn record(&self, key: K, payload: V) {
        self.lock().insert(key, payload);
    }

    /// Drops the pending payload for `key`, if any.
    pub fn discard(&self, key: &K) -> Option<V> {
        self.lock().remove(key)
    }

    /// Swaps the pending map for an empty one and returns its payloads.
    pub fn drain(&self) -> Vec<V> {
        let drained = std::mem::take(&mut *self.lock());
        drained.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Every critical section leaves the map valid, so a panic elsewhere while
    // the lock was held does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, HashMap<K, V>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for CoalescingBuffer<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
