//! Cache Store Module
//!
//! Main cache engine: a shared backend for cross-process state, an owned
//! local map as fallback, and hit/miss accounting.
//!
//! Every shared backend call is guarded. On error or timeout the failure is
//! logged with its operation and key, the backend is marked disconnected,
//! and the call is served by the local map instead. Callers never see
//! backend or serialization failures.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheStats, KeyPattern, KeyTtl, LocalStore, SharedBackend, StatsSnapshot, TagIndex,
};
use crate::config::Config;
use crate::error::Result;

/// Default per-operation timeout against the shared backend.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(500);

// == Set Options ==
/// Per-write TTL and tags.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Time to live; the store default applies when `None`
    pub ttl: Option<Duration>,
    /// Tags to register the key under
    pub tags: Vec<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

// == Cache Store ==
/// Key/value storage with TTL over a shared backend with local fallback.
pub struct CacheStore {
    /// Cross-process backend, absent in local-only mode
    shared: Option<Arc<dyn SharedBackend>>,
    /// Per-instance fallback map
    local: RwLock<LocalStore>,
    /// Hit/miss counters
    stats: CacheStats,
    /// Outcome of the last shared backend call
    connected: AtomicBool,
    /// TTL for writes that do not specify one
    default_ttl: Duration,
    /// Upper bound on any single shared backend call
    op_timeout: Duration,
}

impl CacheStore {
    // == Constructors ==
    /// Creates a store without a shared backend. Every operation uses the local map.
    pub fn local(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            shared: None,
            local: RwLock::new(LocalStore::new(max_entries)),
            stats: CacheStats::new(),
            connected: AtomicBool::new(false),
            default_ttl,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Creates a store over `backend`, keeping a local map for outages.
    pub fn with_backend(
        backend: Arc<dyn SharedBackend>,
        max_entries: usize,
        default_ttl: Duration,
    ) -> Self {
        Self {
            shared: Some(backend),
            connected: AtomicBool::new(true),
            ..Self::local(max_entries, default_ttl)
        }
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Creates a store from configuration.
    ///
    /// A backend that cannot be reached at startup is logged and the store
    /// runs local-only rather than failing the process.
    pub async fn from_config(config: &Config) -> Self {
        let max_entries = config.max_local_entries;
        let default_ttl = config.default_ttl();

        let store = match &config.redis_url {
            Some(url) => match crate::cache::connect(url, config.backend_timeout()).await {
                Ok(backend) => {
                    info!(backend = backend.backend_type(), "Shared cache backend connected");
                    Self::with_backend(backend, max_entries, default_ttl)
                }
                Err(e) => {
                    warn!(error = %e, "Shared cache backend unavailable, running local-only");
                    Self::local(max_entries, default_ttl)
                }
            },
            None => {
                info!("No shared backend configured, running local-only");
                Self::local(max_entries, default_ttl)
            }
        };
        store.with_op_timeout(config.backend_timeout())
    }

    // == Get ==
    /// Retrieves and decodes a value. Absent, expired and undecodable
    /// values are all misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let decoded = self.peek(key).await;

        if decoded.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        decoded
    }

    /// Like [`get`](Self::get) but leaves the hit/miss counters untouched.
    /// Used for re-checks that are not caller-visible lookups.
    pub async fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read_raw(key).await.and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| warn!(key = %key, error = %e, "Discarding undecodable cache payload"))
                .ok()
        })
    }

    // == Set ==
    /// Encodes and stores a value, registering it under each tag.
    ///
    /// A value that cannot be encoded is logged and skipped.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: &SetOptions) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_raw(key, raw, options).await,
            Err(e) => warn!(key = %key, error = %e, "Skipping unencodable cache value"),
        }
    }

    /// Stores an already-encoded JSON payload.
    pub async fn set_raw(&self, key: &str, raw: String, options: &SetOptions) {
        let ttl = options.ttl.unwrap_or(self.default_ttl);

        let stored = match &self.shared {
            Some(shared) => self
                .guard("set", key, shared.set(key, &raw, Some(ttl)))
                .await
                .is_some(),
            None => false,
        };
        let mut local = self.local.write().await;
        if stored {
            // An older fallback copy must not resurface in the next outage
            local.delete(key);
        } else {
            local.set(key, raw, Some(ttl));
        }
        drop(local);

        let tags: BTreeSet<&String> = options.tags.iter().collect();
        for tag in tags {
            TagIndex::new(self).add_tag(tag, key).await;
        }
    }

    // == Delete ==
    /// Deletes a key from both stores. Returns true if either held it.
    /// Deleting a missing key is a no-op.
    pub async fn delete(&self, key: &str) -> bool {
        let shared_removed = match &self.shared {
            Some(shared) => self
                .guard("delete", key, shared.delete(&[key.to_string()]))
                .await
                .unwrap_or(0)
                > 0,
            None => false,
        };
        let local_removed = self.local.write().await.delete(key);
        shared_removed || local_removed
    }

    // == Delete Pattern ==
    /// Deletes every key matching a glob in both stores.
    ///
    /// # Errors
    /// Returns `InvalidPattern` for a malformed glob.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let pattern = KeyPattern::new(pattern)?;
        let mut removed: BTreeSet<String> = BTreeSet::new();

        if let Some(shared) = &self.shared {
            if let Some(keys) = self.guard("keys", pattern.as_str(), shared.keys(pattern.as_str())).await {
                if self
                    .guard("delete", pattern.as_str(), shared.delete(&keys))
                    .await
                    .is_some()
                {
                    removed.extend(keys);
                }
            }
        }

        removed.extend(self.local.write().await.delete_matching(&pattern));

        debug!(pattern = %pattern.as_str(), removed = removed.len(), "Pattern delete");
        Ok(removed.len())
    }

    // == Clear ==
    /// Removes every entry from both stores.
    pub async fn clear(&self) {
        if let Some(shared) = &self.shared {
            self.guard("flush", "*", shared.flush()).await;
        }
        self.local.write().await.clear();
        info!("Cache cleared");
    }

    // == TTL ==
    /// Remaining lifetime of `key` in whichever store is active.
    pub async fn ttl_remaining(&self, key: &str) -> KeyTtl {
        if let Some(shared) = &self.shared {
            if let Some(ttl) = self.guard("ttl", key, shared.ttl(key)).await {
                return ttl;
            }
        }
        self.local.write().await.ttl(key)
    }

    // == Stats ==
    pub async fn stats(&self) -> StatsSnapshot {
        self.stats
            .snapshot(self.key_count().await, self.is_backend_connected())
    }

    pub async fn key_count(&self) -> usize {
        if let Some(shared) = &self.shared {
            if let Some(count) = self.guard("key_count", "*", shared.key_count()).await {
                return count;
            }
        }
        self.local.read().await.len()
    }

    pub fn is_backend_connected(&self) -> bool {
        self.shared.is_some() && self.connected.load(Ordering::Relaxed)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // == Cleanup Expired ==
    /// Actively drops expired entries from the local map and asks the
    /// shared backend to do the same. Returns the total dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let local = self.local.write().await.cleanup_expired();
        let shared = match &self.shared {
            Some(shared) => self.guard("sweep", "*", shared.sweep()).await.unwrap_or(0),
            None => 0,
        };
        local + shared
    }

    // == Set Primitives ==
    pub(crate) async fn set_add(&self, key: &str, member: &str) {
        if let Some(shared) = &self.shared {
            if self
                .guard("set_add", key, shared.set_add(key, member))
                .await
                .is_some()
            {
                return;
            }
        }
        self.local.write().await.set_add(key, member);
    }

    pub(crate) async fn set_members(&self, key: &str) -> Vec<String> {
        if let Some(shared) = &self.shared {
            if let Some(members) = self.guard("set_members", key, shared.set_members(key)).await {
                return members;
            }
        }
        self.local.read().await.set_members(key)
    }

    /// Atomic set-if-absent against the shared backend.
    ///
    /// Returns `None` when no shared backend could answer, leaving the
    /// caller to decide what that means.
    pub(crate) async fn try_set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Option<bool> {
        let shared = self.shared.as_ref()?;
        self.guard("set_if_absent", key, shared.set_if_absent(key, value, ttl))
            .await
    }

    /// Atomic compare-and-delete against the shared backend. `None` when no
    /// shared backend could answer.
    pub(crate) async fn try_delete_if_equals(&self, key: &str, expected: &str) -> Option<bool> {
        let shared = self.shared.as_ref()?;
        self.guard(
            "delete_if_equals",
            key,
            shared.delete_if_equals(key, expected),
        )
        .await
    }

    // == Internals ==
    async fn read_raw(&self, key: &str) -> Option<String> {
        if let Some(shared) = &self.shared {
            if let Some(value) = self.guard("get", key, shared.get(key)).await {
                return value;
            }
        }
        self.local.write().await.get(key)
    }

    async fn guard<T>(
        &self,
        op: &'static str,
        key: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        match timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => {
                if !self.connected.swap(true, Ordering::Relaxed) {
                    info!(op, key = %key, "Shared cache backend reachable again");
                }
                Some(value)
            }
            Ok(Err(e)) => {
                warn!(op, key = %key, error = %e, "Shared cache backend failed, using local fallback");
                self.connected.store(false, Ordering::Relaxed);
                None
            }
            Err(_) => {
                warn!(op, key = %key, "Shared cache backend timed out, using local fallback");
                self.connected.store(false, Ordering::Relaxed);
                None
            }
        }
    }
}
