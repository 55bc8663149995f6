//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tagcache::cache::{KeyTtl, MemoryBackend, SharedBackend};
use tagcache::{CacheError, CacheStore, Result, StrategyEngine, WorkerPool};

pub const TEST_TTL: Duration = Duration::from_secs(300);

/// Memory backend that can be taken down and brought back, and counts
/// how many calls failed while down and how many reads it served.
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    down: AtomicBool,
    failures: AtomicUsize,
    reads: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(CacheError::backend(op, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedBackend for FlakyBackend {
    async fn ping(&self) -> Result<()> {
        self.check("ping")?;
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check("get")?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.check("set")?;
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check("set_if_absent")?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.check("delete")?;
        self.inner.delete(keys).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        self.check("delete_if_equals")?;
        self.inner.delete_if_equals(key, expected).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check("keys")?;
        self.inner.keys(pattern).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.check("set_add")?;
        self.inner.set_add(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check("set_members")?;
        self.inner.set_members(key).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.check("ttl")?;
        self.inner.ttl(key).await
    }

    async fn key_count(&self) -> Result<usize> {
        self.check("key_count")?;
        self.inner.key_count().await
    }

    async fn sweep(&self) -> Result<usize> {
        self.check("sweep")?;
        self.inner.sweep().await
    }

    async fn flush(&self) -> Result<()> {
        self.check("flush")?;
        self.inner.flush().await
    }

    fn backend_type(&self) -> &'static str {
        "flaky"
    }
}

/// Backend whose every call hangs past the store's operation timeout.
pub struct StalledBackend;

#[async_trait]
impl SharedBackend for StalledBackend {
    async fn ping(&self) -> Result<()> {
        stall().await
    }
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        stall().await
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
        stall().await
    }
    async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool> {
        stall().await
    }
    async fn delete(&self, _keys: &[String]) -> Result<u64> {
        stall().await
    }
    async fn delete_if_equals(&self, _key: &str, _expected: &str) -> Result<bool> {
        stall().await
    }
    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        stall().await
    }
    async fn set_add(&self, _key: &str, _member: &str) -> Result<()> {
        stall().await
    }
    async fn set_members(&self, _key: &str) -> Result<Vec<String>> {
        stall().await
    }
    async fn ttl(&self, _key: &str) -> Result<KeyTtl> {
        stall().await
    }
    async fn key_count(&self) -> Result<usize> {
        stall().await
    }
    async fn flush(&self) -> Result<()> {
        stall().await
    }
    fn backend_type(&self) -> &'static str {
        "stalled"
    }
}

async fn stall<T>() -> Result<T> {
    tokio::time::sleep(Duration::from_secs(60)).await;
    Err(CacheError::Internal("stalled".to_string()))
}

pub fn shared_store(backend: Arc<dyn SharedBackend>) -> Arc<CacheStore> {
    Arc::new(CacheStore::with_backend(backend, 1000, TEST_TTL))
}

pub fn engine_over(store: Arc<CacheStore>) -> StrategyEngine {
    StrategyEngine::new(store, WorkerPool::new(4, 64))
}

pub fn memory_engine() -> StrategyEngine {
    engine_over(shared_store(Arc::new(MemoryBackend::new())))
}
