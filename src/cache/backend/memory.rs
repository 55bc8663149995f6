//! In-process shared backend.
//!
//! Every [`CacheStore`](crate::cache::CacheStore) holding a clone of the same
//! `MemoryBackend` sees the same data, and set-if-absent is atomic under the
//! write lock, so locks taken here are truly exclusive within the process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KeyTtl, SharedBackend};
use crate::cache::{KeyPattern, LocalStore};
use crate::error::Result;

const UNBOUNDED: usize = usize::MAX;

/// Shared backend kept in process memory.
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<RwLock<LocalStore>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(LocalStore::new(UNBOUNDED))),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedBackend for MemoryBackend {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.write().await.get(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.store
            .write()
            .await
            .set(key, value.to_string(), ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        Ok(self
            .store
            .write()
            .await
            .set_if_absent(key, value.to_string(), Some(ttl)))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut store = self.store.write().await;
        Ok(keys.iter().filter(|key| store.delete(key)).count() as u64)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        Ok(self.store.write().await.delete_if_equals(key, expected))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = KeyPattern::new(pattern)?;
        Ok(self.store.read().await.keys(&pattern))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.store.write().await.set_add(key, member);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.store.read().await.set_members(key))
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        Ok(self.store.write().await.ttl(key))
    }

    async fn key_count(&self) -> Result<usize> {
        Ok(self.store.read().await.len())
    }

    async fn sweep(&self) -> Result<usize> {
        Ok(self.store.write().await.cleanup_expired())
    }

    async fn flush(&self) -> Result<()> {
        self.store.write().await.clear();
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
