//! Shared Backend Module
//!
//! The cross-process store behind [`CacheStore`](crate::cache::CacheStore).
//! Only string-keyed values, sets and TTLs are required of an implementation.
//!
//! # Available Backends
//! - **Redis** - multiplexed async connection, `SET NX PX` locks released
//!   through a compare-and-delete script
//! - **Memory** - in-process map with atomic set-if-absent, for single-node
//!   deployments and tests

mod memory;
mod redis_backend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::MemoryBackend;
pub use self::redis_backend::RedisBackend;

/// Remaining lifetime of a key, mirroring `PTTL` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist
    Missing,
    /// Key exists without expiry
    NoExpiry,
    /// Key expires after this duration
    Remaining(Duration),
}

/// Primitives every shared backend must provide.
///
/// Errors are reported as [`CacheError::BackendUnavailable`](crate::error::CacheError)
/// and absorbed by the store; implementations never fall back on their own.
#[async_trait]
pub trait SharedBackend: Send + Sync {
    /// Verifies connectivity.
    async fn ping(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Stores `value` only if `key` is absent. Returns true on success.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Deletes keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Atomically deletes `key` only while it holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    /// Lists keys matching a glob.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    async fn set_add(&self, key: &str, member: &str) -> Result<()>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Number of keys held. In-process backends count live values only.
    async fn key_count(&self) -> Result<usize>;

    /// Reclaims expired entries, returning how many were dropped. Backends
    /// that expire keys on their own keep the default.
    async fn sweep(&self) -> Result<usize> {
        Ok(0)
    }

    /// Removes every key.
    async fn flush(&self) -> Result<()>;

    fn backend_type(&self) -> &'static str;
}

/// Builds the backend named by `url`: `memory://` selects the in-process
/// backend, anything else is handed to the Redis client.
pub async fn connect(url: &str, op_timeout: Duration) -> Result<Arc<dyn SharedBackend>> {
    if url.starts_with("memory://") {
        return Ok(Arc::new(MemoryBackend::new()));
    }
    let backend = RedisBackend::connect(url, op_timeout).await?;
    Ok(Arc::new(backend))
}
