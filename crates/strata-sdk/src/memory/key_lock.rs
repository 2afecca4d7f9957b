//! Per-key serialization over a fixed array of async mutexes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

/// Sharded lock table: two ids on the same shard serialize, which is
/// harmless beyond the extra wait.
pub(crate) struct KeyLocks {
    shards: Vec<Mutex<()>>,
}

impl KeyLocks {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.shards[self.shard(key)].lock().await
    }
}
