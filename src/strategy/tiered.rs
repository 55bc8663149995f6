//! Multi-Level Cache
//!
//! A per-process L1 map in front of the shared L2 store. Lookups try L1,
//! then L2 (backfilling L1 on a hit), then the loader. Loaded values are
//! written to both tiers. The L1 is bounded and evicts its oldest
//! insertions first.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheStore, LocalStore, SetOptions};

#[derive(Debug, Clone)]
pub struct L1Config {
    pub ttl: Duration,
    pub max_size: usize,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_size: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct L2Config {
    pub ttl: Duration,
    pub tags: Vec<String>,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            tags: Vec::new(),
        }
    }
}

/// Where lookups were answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct TierCounters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
}

pub struct MultiLevelCache {
    l1: Mutex<LocalStore>,
    l2: Arc<CacheStore>,
    l1_config: L1Config,
    l2_config: L2Config,
    counters: TierCounters,
}

impl MultiLevelCache {
    pub fn new(l2: Arc<CacheStore>, l1_config: L1Config, l2_config: L2Config) -> Self {
        Self {
            l1: Mutex::new(LocalStore::new(l1_config.max_size)),
            l2,
            l1_config,
            l2_config,
            counters: TierCounters::default(),
        }
    }

    // == Get Or Load ==
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.l1_get::<T>(key) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        if let Some(value) = self.l2.get::<T>(key).await {
            self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
            if let Some(raw) = encode(key, &value) {
                self.l1_put(key, raw);
            }
            debug!(key = %key, "L2 hit, backfilled L1");
            return Ok(value);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let value = load().await?;
        if let Some(raw) = encode(key, &value) {
            self.l1_put(key, raw.clone());
            let options = SetOptions::new()
                .ttl(self.l2_config.ttl)
                .tags(self.l2_config.tags.iter().cloned());
            self.l2.set_raw(key, raw, &options).await;
        }
        Ok(value)
    }

    /// Drops `key` from both tiers.
    pub async fn invalidate(&self, key: &str) -> bool {
        let in_l1 = self.l1.lock().delete(key);
        let in_l2 = self.l2.delete(key).await;
        in_l1 || in_l2
    }

    /// Drops every L1 entry, leaving L2 alone.
    pub fn clear_l1(&self) {
        self.l1.lock().clear();
    }

    pub fn l1_len(&self) -> usize {
        self.l1.lock().len()
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    fn l1_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.l1.lock().get(key)?;
        serde_json::from_str(&raw).ok()
    }

    fn l1_put(&self, key: &str, raw: String) {
        self.l1.lock().set(key, raw, Some(self.l1_config.ttl));
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Option<String> {
    serde_json::to_string(value)
        .map_err(|e| warn!(key = %key, error = %e, "Skipping unencodable tier value"))
        .ok()
}
