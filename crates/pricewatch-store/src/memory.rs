use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{SharedStore, StoreError};

#[derive(Default)]
struct Inner {
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// In-process [`SharedStore`] for tests and single-node runs.
///
/// One mutex serializes every command, which gives the same per-command
/// atomicity as Redis.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of a list, head first.
    #[must_use]
    pub fn list_snapshot(&self, key: &str) -> Vec<String> {
        self.lock()
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn push_back(&self, key: &str, values: &[String]) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let list = inner.lists.entry(key.to_string()).or_default();
        list.extend(values.iter().cloned());
        Ok(list.len())
    }

    async fn pop_front(&self, key: &str, count: usize) -> Result<Vec<String>, StoreError> {
        let mut inner = self.lock();
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(Vec::new());
        };
        let take = count.min(list.len());
        Ok(list.drain(..take).collect())
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.lock().lists.get(key).map_or(0, VecDeque::len))
    }

    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_remove(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .hashes
            .get_mut(key)
            .is_some_and(|h| h.remove(field).is_some()))
    }

    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        let slot = inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert_with(|| "0".to_string());
        let current = slot.parse::<i64>().map_err(|_| StoreError::Malformed {
            key: key.to_string(),
            value: slot.clone(),
        })?;
        let next = current + by;
        *slot = next.to_string();
        Ok(next)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
