//! Caching markers.
//!
//! Each marker carries the caching metadata of one business function and
//! applies it either around a single call (`invoke`) or permanently to a
//! function (`bind`, yielding a [`Bound`] callable).
//!
//! Cache failures never fail the wrapped call; only the function's own
//! error is returned.

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::binding::{ArgList, CallArgs, KeySpec};
use crate::cache::{LockWait, SetOptions};
use crate::strategy::{
    BatchOptions, L1Config, L2Config, MultiLevelCache, StrategyEngine, SwrOptions,
};

type ArgsPredicate = Arc<dyn Fn(&CallArgs) -> bool + Send + Sync>;
type ResultPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

fn passes(condition: &Option<ArgsPredicate>, args: &CallArgs) -> bool {
    condition.as_ref().map_or(true, |check| check(args))
}

/// Whether `unless` vetoes caching `value`. Unencodable values are never cached.
fn vetoed<T: Serialize>(unless: &Option<ResultPredicate>, value: &T) -> bool {
    match unless {
        None => false,
        Some(check) => serde_json::to_value(value).map_or(true, |v| check(&v)),
    }
}

fn set_options(ttl: Option<Duration>, tags: &[String]) -> SetOptions {
    let options = SetOptions::new().tags(tags.iter().cloned());
    match ttl {
        Some(ttl) => options.ttl(ttl),
        None => options,
    }
}

// == Bound ==
/// A function with a marker applied to every call.
pub struct Bound<M, F> {
    marker: M,
    engine: Arc<StrategyEngine>,
    func: Arc<F>,
}

impl<M, F> Bound<M, F> {
    fn new(marker: M, engine: Arc<StrategyEngine>, func: F) -> Self {
        Self {
            marker,
            engine,
            func: Arc::new(func),
        }
    }

    pub fn marker(&self) -> &M {
        &self.marker
    }
}

impl<M: Clone, F> Clone for Bound<M, F> {
    fn clone(&self) -> Self {
        Self {
            marker: self.marker.clone(),
            engine: self.engine.clone(),
            func: self.func.clone(),
        }
    }
}

// == Cacheable ==
/// Read-through caching of a function's result.
#[derive(Clone)]
pub struct Cacheable {
    key: KeySpec,
    ttl: Option<Duration>,
    tags: Vec<String>,
    sync: bool,
    condition: Option<ArgsPredicate>,
    unless: Option<ResultPredicate>,
}

impl Cacheable {
    pub fn new(key: impl Into<KeySpec>) -> Self {
        Self {
            key: key.into(),
            ttl: None,
            tags: Vec::new(),
            sync: false,
            condition: None,
            unless: None,
        }
    }

    pub fn ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.ttl = Some(ttl.into());
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

    /// Serializes concurrent misses through the key's lock.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Caching applies only to calls whose arguments satisfy `condition`.
    pub fn condition(mut self, condition: impl Fn(&CallArgs) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Results satisfying `unless` are returned but not cached.
    pub fn unless(mut self, unless: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.unless = Some(Arc::new(unless));
        self
    }

    pub async fn invoke<T, E, F, Fut>(
        &self,
        engine: &StrategyEngine,
        args: &CallArgs,
        call: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !passes(&self.condition, args) {
            return call().await;
        }

        let key = self.key.resolve(args);
        let options = set_options(self.ttl, &self.tags);
        let keep = |value: &T| !vetoed(&self.unless, value);

        if self.sync {
            engine.get_or_set_if(&key, call, &options, keep).await
        } else {
            engine.read_through_if(&key, call, &options, keep).await
        }
    }

    pub fn bind<F>(self, engine: Arc<StrategyEngine>, func: F) -> Bound<Self, F> {
        Bound::new(self, engine, func)
    }
}

impl<F> Bound<Cacheable, F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        A: ArgList,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
    {
        let call_args = args.call_args();
        let func: &F = &self.func;
        self.marker
            .invoke(&self.engine, &call_args, move || func(args))
            .await
    }
}

// == Evict ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictTarget {
    Key(KeySpec),
    Tags(Vec<String>),
    Pattern(String),
    AllEntries,
}

/// Removes cache entries around a call.
#[derive(Clone)]
pub struct Evict {
    target: EvictTarget,
    before_invocation: bool,
    condition: Option<ArgsPredicate>,
}

impl Evict {
    pub fn new(target: EvictTarget) -> Self {
        Self {
            target,
            before_invocation: false,
            condition: None,
        }
    }

    pub fn key(key: impl Into<KeySpec>) -> Self {
        Self::new(EvictTarget::Key(key.into()))
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(EvictTarget::Tags(tags.into_iter().map(Into::into).collect()))
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::new(EvictTarget::Pattern(pattern.into()))
    }

    pub fn all_entries() -> Self {
        Self::new(EvictTarget::AllEntries)
    }

    /// Evicts before the call runs, whatever its outcome. By default
    /// eviction happens after a successful call only.
    pub fn before_invocation(mut self, before: bool) -> Self {
        self.before_invocation = before;
        self
    }

    pub fn condition(mut self, condition: impl Fn(&CallArgs) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub async fn invoke<T, E, F, Fut>(
        &self,
        engine: &StrategyEngine,
        args: &CallArgs,
        call: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let enabled = passes(&self.condition, args);
        if enabled && self.before_invocation {
            self.evict(engine, args).await;
        }

        let result = call().await;

        if enabled && !self.before_invocation && result.is_ok() {
            self.evict(engine, args).await;
        }
        result
    }

    async fn evict(&self, engine: &StrategyEngine, args: &CallArgs) {
        match &self.target {
            EvictTarget::Key(spec) => {
                let key = spec.resolve(args);
                let removed = engine.delete(&key).await;
                debug!(key = %key, removed, "Evicted key");
            }
            EvictTarget::Tags(tags) => {
                for tag in tags {
                    let removed = engine.invalidate_by_tag(tag).await;
                    debug!(tag = %tag, removed, "Evicted tag");
                }
            }
            EvictTarget::Pattern(pattern) => match engine.delete_pattern(pattern).await {
                Ok(removed) => debug!(pattern = %pattern, removed, "Evicted pattern"),
                Err(e) => warn!(pattern = %pattern, error = %e, "Eviction pattern rejected"),
            },
            EvictTarget::AllEntries => engine.clear().await,
        }
    }

    pub fn bind<F>(self, engine: Arc<StrategyEngine>, func: F) -> Bound<Self, F> {
        Bound::new(self, engine, func)
    }
}

impl<F> Bound<Evict, F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        A: ArgList,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let call_args = args.call_args();
        let func: &F = &self.func;
        self.marker
            .invoke(&self.engine, &call_args, move || func(args))
            .await
    }
}

// == Put ==
/// Always runs the call and caches its result.
#[derive(Clone)]
pub struct Put {
    key: KeySpec,
    ttl: Option<Duration>,
    tags: Vec<String>,
    condition: Option<ArgsPredicate>,
    unless: Option<ResultPredicate>,
}

impl Put {
    pub fn new(key: impl Into<KeySpec>) -> Self {
        Self {
            key: key.into(),
            ttl: None,
            tags: Vec::new(),
            condition: None,
            unless: None,
        }
    }

    pub fn ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.ttl = Some(ttl.into());
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

    pub fn condition(mut self, condition: impl Fn(&CallArgs) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn unless(mut self, unless: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.unless = Some(Arc::new(unless));
        self
    }

    pub async fn invoke<T, E, F, Fut>(
        &self,
        engine: &StrategyEngine,
        args: &CallArgs,
        call: F,
    ) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = call().await?;
        if passes(&self.condition, args) && !vetoed(&self.unless, &value) {
            let key = self.key.resolve(args);
            engine
                .set(&key, &value, &set_options(self.ttl, &self.tags))
                .await;
        }
        Ok(value)
    }

    pub fn bind<F>(self, engine: Arc<StrategyEngine>, func: F) -> Bound<Self, F> {
        Bound::new(self, engine, func)
    }
}

impl<F> Bound<Put, F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        A: ArgList,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
    {
        let call_args = args.call_args();
        let func: &F = &self.func;
        self.marker
            .invoke(&self.engine, &call_args, move || func(args))
            .await
    }
}

// == Invalidate Tags ==
/// Invalidates tags after a successful call.
#[derive(Debug, Clone)]
pub struct InvalidateTags {
    tags: Vec<String>,
}

impl InvalidateTags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub async fn invoke<T, E, F, Fut>(&self, engine: &StrategyEngine, call: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = call().await?;
        for tag in &self.tags {
            let removed = engine.invalidate_by_tag(tag).await;
            debug!(tag = %tag, removed, "Tag invalidated after call");
        }
        Ok(value)
    }

    pub fn bind<F>(self, engine: Arc<StrategyEngine>, func: F) -> Bound<Self, F> {
        Bound::new(self, engine, func)
    }
}

impl<F> Bound<InvalidateTags, F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let func: &F = &self.func;
        self.marker.invoke(&self.engine, move || func(args)).await
    }
}

// == Multi Level ==
/// Two-tier caching. The marker owns its L1, so clones share it.
#[derive(Clone)]
pub struct MultiLevel {
    key: KeySpec,
    cache: Arc<MultiLevelCache>,
}

impl MultiLevel {
    pub fn new(
        key: impl Into<KeySpec>,
        engine: &StrategyEngine,
        l1: L1Config,
        l2: L2Config,
    ) -> Self {
        Self {
            key: key.into(),
            cache: Arc::new(engine.multi_level(l1, l2)),
        }
    }

    pub fn cache(&self) -> &MultiLevelCache {
        &self.cache
    }

    pub async fn invoke<T, E, F, Fut>(&self, args: &CallArgs, call: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.key.resolve(args);
        self.cache.get_or_load(&key, call).await
    }

    pub fn bind<F>(self, engine: Arc<StrategyEngine>, func: F) -> Bound<Self, F> {
        Bound::new(self, engine, func)
    }
}

impl<F> Bound<MultiLevel, F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        A: ArgList,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
    {
        let call_args = args.call_args();
        let func: &F = &self.func;
        self.marker.invoke(&call_args, move || func(args)).await
    }
}

// == Stale While Revalidate ==
#[derive(Debug, Clone)]
pub struct StaleWhileRevalidate {
    key: KeySpec,
    options: SwrOptions,
}

impl StaleWhileRevalidate {
    pub fn new(
        key: impl Into<KeySpec>,
        stale_time: impl Into<Duration>,
        max_age: impl Into<Duration>,
    ) -> Self {
        Self {
            key: key.into(),
            options: SwrOptions::new(stale_time, max_age),
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.tags(tags);
        self
    }

    /// `call` may run again in the background, so it must be repeatable
    /// and own everything it uses.
    pub async fn invoke<T, E, F, Fut>(
        &self,
        engine: &StrategyEngine,
        args: &CallArgs,
        call: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = self.key.resolve(args);
        engine.stale_while_revalidate(&key, call, &self.options).await
    }

    pub fn bind<F>(self, engine: Arc<StrategyEngine>, func: F) -> Bound<Self, F> {
        Bound::new(self, engine, func)
    }
}

impl<F> Bound<StaleWhileRevalidate, F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        A: ArgList + Clone + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
    {
        let call_args = args.call_args();
        let func = self.func.clone();
        self.marker
            .invoke(&self.engine, &call_args, move || {
                let func: &F = &func;
                func(args.clone())
            })
            .await
    }
}

// == Batch Cacheable ==
/// Per-id caching of a batch fetch. `id_of` extracts the id of a fetched item.
#[derive(Clone)]
pub struct BatchCacheable<X> {
    options: BatchOptions,
    id_of: X,
}

impl<X> BatchCacheable<X> {
    pub fn new(key_prefix: impl Into<String>, id_of: X) -> Self {
        Self {
            options: BatchOptions::new(key_prefix),
            id_of,
        }
    }

    pub fn ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.options = self.options.ttl(ttl);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.tags(tags);
        self
    }

    pub async fn invoke<I, T, E, F, Fut>(
        &self,
        engine: &StrategyEngine,
        ids: &[I],
        fetch: F,
    ) -> Result<Vec<Option<T>>, E>
    where
        I: Display + Eq + Hash + Clone,
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce(Vec<I>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
        X: Fn(&T) -> I,
    {
        engine
            .batch_get(ids, fetch, &self.id_of, &self.options)
            .await
    }

    pub fn bind<F>(self, engine: Arc<StrategyEngine>, func: F) -> Bound<Self, F> {
        Bound::new(self, engine, func)
    }
}

impl<X, F> Bound<BatchCacheable<X>, F> {
    pub async fn call<I, T, E, Fut>(&self, ids: &[I]) -> Result<Vec<Option<T>>, E>
    where
        I: Display + Eq + Hash + Clone,
        T: Serialize + DeserializeOwned + Clone,
        F: Fn(Vec<I>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
        X: Fn(&T) -> I,
    {
        let func: &F = &self.func;
        self.marker.invoke(&self.engine, ids, func).await
    }
}

// == Lock Guarded ==
/// Runs a call while holding the key's lock, waiting up to `lock_timeout`
/// for it. When the wait runs out the call proceeds without the lock.
#[derive(Debug, Clone)]
pub struct LockGuarded {
    key: KeySpec,
    lock_timeout: Duration,
    lock_ttl: Option<Duration>,
}

impl LockGuarded {
    pub fn new(key: impl Into<KeySpec>, lock_timeout: impl Into<Duration>) -> Self {
        Self {
            key: key.into(),
            lock_timeout: lock_timeout.into(),
            lock_ttl: None,
        }
    }

    /// Hard expiry of the lock. Defaults to the engine's lock TTL.
    pub fn lock_ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.lock_ttl = Some(ttl.into());
        self
    }

    pub async fn invoke<T, E, F, Fut>(
        &self,
        engine: &StrategyEngine,
        args: &CallArgs,
        call: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.key.resolve(args);
        let ttl = self.lock_ttl.unwrap_or(engine.locks().default_ttl());
        let wait = LockWait::new(LOCK_RETRY_INTERVAL, self.lock_timeout);

        let lock = engine.locks().lock_within(&key, ttl, wait).await;
        if lock.is_none() {
            warn!(key = %key, timeout_ms = self.lock_timeout.as_millis() as u64, "Lock wait timed out, running unguarded");
        }

        let result = call().await;
        if let Some(lock) = lock {
            lock.release().await;
        }
        result
    }

    pub fn bind<F>(self, engine: Arc<StrategyEngine>, func: F) -> Bound<Self, F> {
        Bound::new(self, engine, func)
    }
}

impl<F> Bound<LockGuarded, F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        A: ArgList,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let call_args = args.call_args();
        let func: &F = &self.func;
        self.marker
            .invoke(&self.engine, &call_args, move || func(args))
            .await
    }
}
