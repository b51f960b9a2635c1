//! Per-conversation write serialization.
//!
//! The append pipeline is a read-modify-write over the whole conversation,
//! so two appends to the same conversation must not interleave. Each
//! conversation id maps to its own async mutex; appends to different
//! conversations never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Once the map holds more entries than this, idle locks are evicted.
const PRUNE_THRESHOLD: usize = 1_024;

#[derive(Clone, Debug, Default)]
pub struct ConversationLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds the lock for `conversation_id`.
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    tracing::error!("conversation lock map poisoned, recovering");
                    poisoned.into_inner()
                }
            };

            // Only entries nobody holds or waits on are evicted; anyone
            // holding a clone keeps the strong count above one.
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            map.entry(conversation_id.to_string())
                .or_default()
                .clone()
        };

        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}
