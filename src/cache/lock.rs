//! Lock Manager Module
//!
//! Advisory, TTL-bounded mutual exclusion keyed by cache key. Used to cut
//! duplicate recomputation, never to protect business invariants: failing
//! to acquire only means the caller does its own work.
//!
//! Locks live under `lock:<key>` with a hard TTL, so a crashed holder
//! cannot leave a permanent lock. Each acquisition writes a fresh token and
//! release deletes the lock only while it still carries that token, so a
//! holder whose lock expired never frees the next holder's lock.
//! Exclusivity exists only while the shared backend answers. Without one
//! (local-only mode or during an outage) every acquisition reports success
//! and provides no exclusivity at all.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::CacheStore;

/// Namespace prefix for lock keys.
pub const LOCK_PREFIX: &str = "lock:";

pub fn lock_key(key: &str) -> String {
    format!("{LOCK_PREFIX}{key}")
}

// == Lock Wait ==
/// How long a caller that lost a lock race keeps polling before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockWait {
    pub retry_interval: Duration,
    pub max_wait: Duration,
}

impl LockWait {
    pub fn new(retry_interval: Duration, max_wait: Duration) -> Self {
        Self {
            retry_interval,
            max_wait,
        }
    }

    /// Polls `check` every `retry_interval` until it yields a value or
    /// `max_wait` elapses.
    pub async fn poll<T, F, Fut>(&self, mut check: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let deadline = Instant::now() + self.max_wait;
        while Instant::now() < deadline {
            sleep(self.retry_interval.max(Duration::from_millis(1))).await;
            if let Some(found) = check().await {
                return Some(found);
            }
        }
        None
    }
}

impl Default for LockWait {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_secs(5))
    }
}

async fn release_token(store: &CacheStore, key: &str, token: &str) {
    match store.try_delete_if_equals(&lock_key(key), token).await {
        Some(true) => debug!(key = %key, "Lock released"),
        Some(false) => debug!(key = %key, "Lock already expired or taken over, left alone"),
        None => debug!(key = %key, "No shared backend, nothing to release"),
    }
}

// == Lock Guard ==
/// A held lock. Call [`release`](Self::release) when done; a guard dropped
/// while still held (cancelled caller, panic) releases in the background.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    store: Arc<CacheStore>,
    key: String,
    token: String,
    held: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn release(mut self) {
        self.held = false;
        release_token(&self.store, &self.key, &self.token).await;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(key = %self.key, "No runtime to release dropped lock, leaving it to expire");
            return;
        };
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        debug!(key = %key, "Lock dropped while held, releasing in background");
        runtime.spawn(async move {
            release_token(&store, &key, &token).await;
        });
    }
}

// == Lock Manager ==
pub struct LockManager {
    store: Arc<CacheStore>,
    default_ttl: Duration,
    /// Tokens of locks taken through the key-based API
    held: DashMap<String, String>,
}

impl LockManager {
    pub fn new(store: Arc<CacheStore>, default_ttl: Duration) -> Self {
        Self {
            store,
            default_ttl,
            held: DashMap::new(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn claim(&self, key: &str, ttl: Duration) -> Option<String> {
        let token = Uuid::new_v4().to_string();
        match self.store.try_set_if_absent(&lock_key(key), &token, ttl).await {
            Some(true) => {
                debug!(key = %key, "Lock acquired");
                Some(token)
            }
            Some(false) => {
                debug!(key = %key, "Lock held elsewhere");
                None
            }
            None => {
                debug!(key = %key, "No shared backend for lock, proceeding without exclusivity");
                Some(token)
            }
        }
    }

    // == Guarded ==
    /// Takes the lock for `key` for `ttl`, returning a guard that owns it.
    pub async fn lock(&self, key: &str, ttl: Duration) -> Option<LockGuard> {
        let token = self.claim(key, ttl).await?;
        Some(LockGuard {
            store: self.store.clone(),
            key: key.to_string(),
            token,
            held: true,
        })
    }

    /// Keeps retrying [`lock`](Self::lock) within `wait`.
    pub async fn lock_within(&self, key: &str, ttl: Duration, wait: LockWait) -> Option<LockGuard> {
        if let Some(guard) = self.lock(key, ttl).await {
            return Some(guard);
        }
        wait.poll(move || self.lock(key, ttl)).await
    }

    // == Try Acquire ==
    /// Attempts to take the lock for `key` for `ttl`, to be freed with
    /// [`release`](Self::release).
    ///
    /// Returns true without exclusivity when no shared backend answered.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> bool {
        match self.claim(key, ttl).await {
            Some(token) => {
                self.held.insert(key.to_string(), token);
                true
            }
            None => false,
        }
    }

    /// Keeps retrying `try_acquire` within `wait`. Returns whether the lock
    /// was eventually taken.
    pub async fn acquire_within(&self, key: &str, ttl: Duration, wait: LockWait) -> bool {
        if self.try_acquire(key, ttl).await {
            return true;
        }
        wait.poll(move || async move { self.try_acquire(key, ttl).await.then_some(()) })
            .await
            .is_some()
    }

    // == Release ==
    /// Releases a lock taken with `try_acquire`. Releasing a lock that
    /// already expired, or that another holder has since taken, is a no-op.
    pub async fn release(&self, key: &str) {
        match self.held.remove(key) {
            Some((_, token)) => release_token(&self.store, key, &token).await,
            None => debug!(key = %key, "Release of a lock not held here"),
        }
    }
}
