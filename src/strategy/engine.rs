//! Strategy Engine
//!
//! Caching algorithms over [`CacheStore`], [`TagIndex`] and [`LockManager`]:
//! cache-aside with stampede protection, write-through, refresh-ahead,
//! stale-while-revalidate and batch lookups.
//!
//! Factory and persistence errors are returned to the caller unchanged.
//! Cache failures never are.

use std::collections::HashMap;
use std::convert::identity;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{
    current_timestamp_ms, CacheStore, KeyTtl, LockManager, LockWait, SetOptions, StatsSnapshot,
    TagIndex,
};
use crate::config::Config;
use crate::error::Result;
use crate::strategy::{
    BatchOptions, L1Config, L2Config, MultiLevelCache, RefreshAheadOptions, SwrOptions,
    DEFAULT_REFRESH_THRESHOLD,
};
use crate::tasks::WorkerPool;

const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

/// Value plus the time it was last fetched, as stored by stale-while-revalidate.
#[derive(Debug, Serialize, Deserialize)]
struct SwrEntry<T> {
    value: T,
    refreshed_at: u64,
}

impl<T> SwrEntry<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            refreshed_at: current_timestamp_ms(),
        }
    }

    fn age(&self) -> Duration {
        Duration::from_millis(current_timestamp_ms().saturating_sub(self.refreshed_at))
    }
}

/// Claim on a key's background refresh slot; released on drop.
struct InFlight {
    keys: Arc<DashSet<String>>,
    key: String,
}

impl InFlight {
    fn claim(keys: &Arc<DashSet<String>>, key: &str) -> Option<Self> {
        keys.insert(key.to_string()).then(|| Self {
            keys: keys.clone(),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}

// == Strategy Engine ==
pub struct StrategyEngine {
    store: Arc<CacheStore>,
    locks: LockManager,
    workers: WorkerPool,
    /// Keys with a background refresh scheduled or running
    refreshing: Arc<DashSet<String>>,
    lock_wait: LockWait,
    refresh_threshold: f64,
}

impl StrategyEngine {
    pub fn new(store: Arc<CacheStore>, workers: WorkerPool) -> Self {
        Self {
            locks: LockManager::new(store.clone(), DEFAULT_LOCK_TTL),
            store,
            workers,
            refreshing: Arc::new(DashSet::new()),
            lock_wait: LockWait::default(),
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
        }
    }

    pub fn from_config(store: Arc<CacheStore>, workers: WorkerPool, config: &Config) -> Self {
        Self::new(store, workers)
            .with_lock_ttl(config.lock_ttl())
            .with_refresh_threshold(config.refresh_threshold)
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.locks = LockManager::new(self.store.clone(), ttl);
        self
    }

    pub fn with_lock_wait(mut self, wait: LockWait) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn with_refresh_threshold(mut self, threshold: f64) -> Self {
        self.refresh_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn tags(&self) -> TagIndex<'_> {
        TagIndex::new(&self.store)
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Builds an L1/L2 tier whose L2 is this engine's store.
    pub fn multi_level(&self, l1: L1Config, l2: L2Config) -> MultiLevelCache {
        MultiLevelCache::new(self.store.clone(), l1, l2)
    }

    // == Core API ==
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.store.get(key).await
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: &SetOptions) {
        self.store.set(key, value, options).await
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.store.delete(key).await
    }

    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        self.store.delete_pattern(pattern).await
    }

    pub async fn clear(&self) {
        self.store.clear().await
    }

    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        self.tags().invalidate_tag(tag).await
    }

    pub async fn acquire_lock(&self, key: &str, ttl: Duration) -> bool {
        self.locks.try_acquire(key, ttl).await
    }

    pub async fn release_lock(&self, key: &str) {
        self.locks.release(key).await
    }

    pub async fn get_stats(&self) -> StatsSnapshot {
        self.store.stats().await
    }

    // == Get Or Set ==
    /// Cache-aside with stampede protection.
    ///
    /// Hit → return. Miss → take the key's lock, re-check, compute, store,
    /// release. When another caller holds the lock, wait for its result
    /// within the engine's [`LockWait`], then compute unprotected.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: &SetOptions,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.get_or_set_if(key, factory, options, |_| true).await
    }

    /// [`get_or_set`](Self::get_or_set) that only stores computed values
    /// accepted by `keep`.
    pub async fn get_or_set_if<T, E, F, Fut, K>(
        &self,
        key: &str,
        factory: F,
        options: &SetOptions,
        keep: K,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        K: Fn(&T) -> bool,
    {
        if let Some(value) = self.store.get::<T>(key).await {
            return Ok(value);
        }
        self.fill(key, factory, options, keep).await
    }

    /// Cache-aside without locking: concurrent misses each compute.
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: &SetOptions,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.read_through_if(key, factory, options, |_| true).await
    }

    pub async fn read_through_if<T, E, F, Fut, K>(
        &self,
        key: &str,
        factory: F,
        options: &SetOptions,
        keep: K,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        K: Fn(&T) -> bool,
    {
        if let Some(value) = self.store.get::<T>(key).await {
            return Ok(value);
        }
        let value = factory().await?;
        if keep(&value) {
            self.store.set(key, &value, options).await;
        }
        Ok(value)
    }

    async fn fill<T, E, F, Fut, K>(
        &self,
        key: &str,
        factory: F,
        options: &SetOptions,
        keep: K,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        K: Fn(&T) -> bool,
    {
        if let Some(lock) = self.locks.lock(key, self.locks.default_ttl()).await {
            if let Some(value) = self.store.peek::<T>(key).await {
                lock.release().await;
                return Ok(value);
            }
            let result = factory().await;
            if let Ok(value) = &result {
                if keep(value) {
                    self.store.set(key, value, options).await;
                }
            }
            lock.release().await;
            return result;
        }

        debug!(key = %key, "Lock held elsewhere, waiting for its result");
        let store = &self.store;
        if let Some(value) = self.lock_wait.poll(move || store.peek::<T>(key)).await {
            return Ok(value);
        }

        debug!(key = %key, "No result after waiting, computing without lock");
        let value = factory().await?;
        if keep(&value) {
            self.store.set(key, &value, options).await;
        }
        Ok(value)
    }

    // == Write Through ==
    /// Persists first, then caches what was persisted. A persistence
    /// failure is returned and leaves the cache untouched.
    pub async fn write_through<T, E, F, Fut>(
        &self,
        key: &str,
        value: T,
        persist: F,
        options: &SetOptions,
    ) -> std::result::Result<T, E>
    where
        T: Serialize,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let persisted = persist(value).await?;
        self.store.set(key, &persisted, options).await;
        Ok(persisted)
    }

    // == Refresh Ahead ==
    /// Serves the cached value and, when its remaining TTL fraction has
    /// dropped below the threshold, republishes it in the background.
    /// A miss computes synchronously through [`get_or_set`](Self::get_or_set).
    pub async fn get_with_refresh_ahead<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: &RefreshAheadOptions,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let factory = Arc::new(factory);
        let set_options = options.set_options();

        if let Some(value) = self.store.get::<T>(key).await {
            let threshold = options.threshold.unwrap_or(self.refresh_threshold);
            if let KeyTtl::Remaining(remaining) = self.store.ttl_remaining(key).await {
                let fraction =
                    remaining.as_secs_f64() / options.ttl.as_secs_f64().max(f64::EPSILON);
                if fraction < threshold {
                    debug!(key = %key, fraction, threshold, "Refreshing ahead of expiry");
                    self.schedule_refresh(key, factory, set_options, identity::<T>);
                }
            }
            return Ok(value);
        }

        self.fill(key, move || factory(), &set_options, |_| true)
            .await
    }

    // == Stale While Revalidate ==
    /// Fresh → serve. Stale (past `stale_time`) → serve and schedule one
    /// background refresh per key. Absent or past `max_age` → block and
    /// refetch.
    pub async fn stale_while_revalidate<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: &SwrOptions,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let factory = Arc::new(factory);
        let set_options = options.set_options();

        if let Some(entry) = self.store.get::<SwrEntry<T>>(key).await {
            let age = entry.age();
            if age < options.max_age {
                if age >= options.stale_time {
                    debug!(key = %key, age_ms = age.as_millis() as u64, "Serving stale value");
                    self.schedule_refresh(key, factory, set_options, SwrEntry::fresh);
                }
                return Ok(entry.value);
            }
            debug!(key = %key, "Value past max age, refetching");
            self.store.delete(key).await;
        }

        let entry = self
            .fill(
                key,
                move || async move { factory().await.map(SwrEntry::fresh) },
                &set_options,
                |_| true,
            )
            .await?;
        Ok(entry.value)
    }

    /// Schedules a background recompute of `key` unless one is already in
    /// flight. Returns whether a refresh was scheduled.
    fn schedule_refresh<T, E, F, Fut, P>(
        &self,
        key: &str,
        factory: Arc<F>,
        options: SetOptions,
        publish: fn(T) -> P,
    ) -> bool
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        P: Serialize + 'static,
    {
        let Some(claim) = InFlight::claim(&self.refreshing, key) else {
            debug!(key = %key, "Refresh already in flight");
            return false;
        };

        let store = self.store.clone();
        let key = key.to_string();
        let task_name = format!("refresh:{key}");
        self.workers.submit(&task_name, async move {
            let _claim = claim;
            let value = match factory().await {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key, error = %e, "Background refresh failed");
                    return;
                }
            };
            let encoded = serde_json::to_string(&publish(value));
            match encoded {
                Ok(raw) => {
                    store.set_raw(&key, raw, &options).await;
                    debug!(key = %key, "Background refresh published");
                }
                Err(e) => warn!(key = %key, error = %e, "Background refresh produced unencodable value"),
            }
        })
    }

    // == Batch ==
    /// Looks up each id individually, fetches only the missing ones in a
    /// single call, caches them per id and returns results in `ids` order.
    /// Ids the fetch did not return come back as `None`.
    pub async fn batch_get<I, T, E, F, Fut, X>(
        &self,
        ids: &[I],
        fetch: F,
        id_of: X,
        options: &BatchOptions,
    ) -> std::result::Result<Vec<Option<T>>, E>
    where
        I: Display + Eq + Hash + Clone,
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce(Vec<I>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, E>>,
        X: Fn(&T) -> I,
    {
        let mut results: Vec<Option<T>> = Vec::with_capacity(ids.len());
        let mut missing: Vec<I> = Vec::new();
        for id in ids {
            let cached = self.store.get::<T>(&options.key_for(id)).await;
            if cached.is_none() && !missing.contains(id) {
                missing.push(id.clone());
            }
            results.push(cached);
        }

        if missing.is_empty() {
            return Ok(results);
        }
        debug!(requested = ids.len(), missing = missing.len(), "Batch lookup");

        let fetched = fetch(missing).await?;
        let set_options = options.set_options();
        let mut by_id: HashMap<I, T> = HashMap::with_capacity(fetched.len());
        for item in fetched {
            let id = id_of(&item);
            self.store
                .set(&options.key_for(&id), &item, &set_options)
                .await;
            by_id.insert(id, item);
        }

        for (slot, id) in results.iter_mut().zip(ids) {
            if slot.is_none() {
                *slot = by_id.get(id).cloned();
            }
        }
        Ok(results)
    }

    /// Drains background refreshes within `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        self.workers.shutdown(grace).await
    }
}
