//! Integration Tests for Caching Strategies
//!
//! End-to-end behavior of the engine over shared, failing and local-only
//! backends.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tagcache::binding::{CallArgs, Cacheable, KeySpec};
use tagcache::cache::{KeyTtl, MemoryBackend, SharedBackend};
use tagcache::{
    well_known, CacheStore, L1Config, L2Config, RefreshAheadOptions, SetOptions, StrategyEngine,
    SwrOptions, WorkerPool,
};

use common::{engine_over, memory_engine, shared_store, FlakyBackend, StalledBackend, TEST_TTL};

type Outcome<T> = Result<T, String>;

// == Storage ==

#[tokio::test]
async fn test_roundtrip_before_expiry() {
    let engine = memory_engine();
    let value = serde_json::json!({"festival": "Sunburst", "capacity": 12000});

    engine
        .set("festival:1", &value, &SetOptions::new().ttl(Duration::from_secs(60)))
        .await;

    assert_eq!(engine.get::<serde_json::Value>("festival:1").await, Some(value));
}

#[tokio::test]
async fn test_value_absent_after_ttl() {
    let engine = memory_engine();
    engine
        .set("session:abc", "token", &SetOptions::new().ttl(Duration::from_millis(100)))
        .await;

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(engine.get::<String>("session:abc").await.is_none());
}

#[tokio::test]
async fn test_tag_invalidation_removes_exactly_tagged_keys() {
    let engine = memory_engine();
    let tagged = SetOptions::new().tags([well_known::FESTIVAL]);
    engine.set("A", &1u32, &tagged).await;
    engine.set("B", &2u32, &tagged).await;
    engine.set("C", &3u32, &SetOptions::new()).await;

    assert_eq!(engine.invalidate_by_tag(well_known::FESTIVAL).await, 2);
    assert!(engine.get::<u32>("A").await.is_none());
    assert!(engine.get::<u32>("B").await.is_none());
    assert_eq!(engine.get::<u32>("C").await, Some(3));

    // Stale memberships are a no-op on the second pass
    assert_eq!(engine.invalidate_by_tag(well_known::FESTIVAL).await, 0);
}

#[tokio::test]
async fn test_pattern_delete() {
    let engine = memory_engine();
    for key in ["session:1", "session:2", "user:1"] {
        engine.set(key, &true, &SetOptions::new()).await;
    }

    assert_eq!(engine.delete_pattern("session:*").await.unwrap(), 2);
    assert!(engine.get::<bool>("session:1").await.is_none());
    assert_eq!(engine.get::<bool>("user:1").await, Some(true));
}

// == Stampede Protection ==

#[tokio::test]
async fn test_concurrent_misses_invoke_factory_once() {
    let engine = memory_engine();
    let calls = AtomicUsize::new(0);
    let options = SetOptions::new();

    let requests = (0..10).map(|_| {
        engine.get_or_set(
            "stats:festival:1",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<u32, String>(42)
            },
            &options,
        )
    });
    let results = join_all(requests).await;

    assert!(results.iter().all(|r| r == &Ok(42)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stampede_protection_across_processes() {
    // Two engines with separate stores and local maps, one shared backend
    let backend: Arc<dyn SharedBackend> = Arc::new(MemoryBackend::new());
    let first = Arc::new(engine_over(shared_store(backend.clone())));
    let second = Arc::new(engine_over(shared_store(backend)));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for engine in [first, second] {
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            engine
                .get_or_set(
                    "report:daily",
                    || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<String, String>("pdf".to_string())
                    },
                    &SetOptions::new(),
                )
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().as_deref(), Ok("pdf"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lock_release_allows_reacquire() {
    let engine = memory_engine();

    assert!(engine.acquire_lock("payout", Duration::from_secs(5)).await);
    assert!(!engine.acquire_lock("payout", Duration::from_secs(5)).await);

    engine.release_lock("payout").await;
    assert!(engine.acquire_lock("payout", Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_lock_expires_without_release() {
    let engine = memory_engine();

    assert!(engine.acquire_lock("payout", Duration::from_millis(50)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(engine.acquire_lock("payout", Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_fallback_lock_always_succeeds() {
    let store = Arc::new(CacheStore::local(100, TEST_TTL));
    let engine = engine_over(store);

    assert!(engine.acquire_lock("k", Duration::from_secs(5)).await);
    assert!(engine.acquire_lock("k", Duration::from_secs(5)).await);
}

// == Fallback ==

#[tokio::test]
async fn test_backend_failure_falls_back_to_local() {
    let backend = Arc::new(FlakyBackend::new());
    let engine = engine_over(shared_store(backend.clone()));

    backend.set_down(true);
    engine.set("user:1", "alice", &SetOptions::new()).await;

    assert_eq!(engine.get::<String>("user:1").await.as_deref(), Some("alice"));
    assert!(backend.failures() >= 2);
    assert!(!engine.get_stats().await.backend_connected);
}

#[tokio::test]
async fn test_backend_recovery_is_reported() {
    let backend = Arc::new(FlakyBackend::new());
    let engine = engine_over(shared_store(backend.clone()));

    backend.set_down(true);
    assert!(engine.get::<u32>("k").await.is_none());
    assert!(!engine.store().is_backend_connected());

    backend.set_down(false);
    engine.set("k", &1u32, &SetOptions::new()).await;

    assert!(engine.store().is_backend_connected());
    assert_eq!(backend.inner().get("k").await.unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_outage_does_not_resurface_value_overwritten_after_recovery() {
    let backend = Arc::new(FlakyBackend::new());
    let engine = engine_over(shared_store(backend.clone()));

    backend.set_down(true);
    engine.set("k", "v1", &SetOptions::new()).await;
    backend.set_down(false);
    engine.set("k", "v2", &SetOptions::new()).await;
    backend.set_down(true);

    assert_ne!(engine.get::<String>("k").await.as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_stalled_backend_times_out_to_local() {
    let store = CacheStore::with_backend(Arc::new(StalledBackend), 100, TEST_TTL)
        .with_op_timeout(Duration::from_millis(50));
    let engine = engine_over(Arc::new(store));

    let started = Instant::now();
    engine.set("k", &7u32, &SetOptions::new()).await;
    let value = engine.get::<u32>("k").await;

    assert_eq!(value, Some(7));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_get_or_set_survives_backend_outage() {
    let backend = Arc::new(FlakyBackend::new());
    backend.set_down(true);
    let engine = engine_over(shared_store(backend));

    let value: Outcome<u32> = engine
        .get_or_set("k", || async { Ok(5) }, &SetOptions::new())
        .await;

    assert_eq!(value, Ok(5));
    assert_eq!(engine.get::<u32>("k").await, Some(5));
}

// == Write Through ==

#[tokio::test]
async fn test_write_through_failure_does_not_populate() {
    let engine = memory_engine();

    let result: Outcome<u32> = engine
        .write_through("vendor:9", 9, |_| async { Err("unique violation".to_string()) }, &SetOptions::new())
        .await;

    assert_eq!(result, Err("unique violation".to_string()));
    assert!(engine.get::<u32>("vendor:9").await.is_none());
}

// == Refresh Ahead ==

#[tokio::test]
async fn test_refresh_ahead_schedules_only_below_threshold() {
    let engine = memory_engine();
    let refreshes = Arc::new(AtomicUsize::new(0));
    let options = RefreshAheadOptions::new(Duration::from_secs(10)).threshold(0.5);

    let factory = {
        let refreshes = refreshes.clone();
        move || {
            let refreshes = refreshes.clone();
            async move {
                refreshes.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, String>(2)
            }
        }
    };

    // 100% remaining: served, no refresh
    engine.set("k", &1u32, &SetOptions::new().ttl(Duration::from_secs(10))).await;
    assert_eq!(engine.get_with_refresh_ahead("k", factory.clone(), &options).await, Ok(1));

    // 30% remaining: served, refreshed once
    engine.set("k", &1u32, &SetOptions::new().ttl(Duration::from_secs(3))).await;
    assert_eq!(engine.get_with_refresh_ahead("k", factory, &options).await, Ok(1));

    engine.shutdown(Duration::from_secs(1)).await;
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert!(matches!(
        engine.store().ttl_remaining("k").await,
        KeyTtl::Remaining(d) if d > Duration::from_secs(5)
    ));
}

// == Stale While Revalidate ==

#[tokio::test]
async fn test_stale_reads_trigger_one_refresh() {
    let engine = memory_engine();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = SwrOptions::new(Duration::from_millis(20), Duration::from_secs(60));

    let factory = {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<u32, String>(n)
            }
        }
    };

    assert_eq!(engine.stale_while_revalidate("k", factory.clone(), &options).await, Ok(0));
    tokio::time::sleep(Duration::from_millis(40)).await;

    let reads = (0..10).map(|_| engine.stale_while_revalidate("k", factory.clone(), &options));
    let results = join_all(reads).await;

    assert!(results.iter().all(|r| r == &Ok(0)), "Stale value served to every reader");
    engine.shutdown(Duration::from_secs(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2, "One fill plus one background refresh");
    assert_eq!(engine.get::<serde_json::Value>("k").await.map(|v| v["value"].clone()), Some(1.into()));
}

// == Multi Level ==

#[tokio::test]
async fn test_l2_hit_backfills_l1() {
    let backend = Arc::new(FlakyBackend::new());
    let engine = engine_over(shared_store(backend.clone()));
    engine.set("zone:1", &"north", &SetOptions::new()).await;
    let tiers = engine.multi_level(L1Config::default(), L2Config::default());
    let reads_before = backend.reads();

    let first: Outcome<String> = tiers
        .get_or_load("zone:1", || async { Err("loader must not run".to_string()) })
        .await;
    assert_eq!(first.as_deref(), Ok("north"));
    assert_eq!(backend.reads(), reads_before + 1);
    assert_eq!(tiers.l1_len(), 1);

    let second: Outcome<String> = tiers
        .get_or_load("zone:1", || async { Err("loader must not run".to_string()) })
        .await;
    assert_eq!(second.as_deref(), Ok("north"));
    assert_eq!(backend.reads(), reads_before + 1);
}

// == Batch ==

#[tokio::test]
async fn test_batch_returns_caller_order() {
    let engine = memory_engine();
    let options = tagcache::BatchOptions::new("ticket").tags([well_known::TICKET]);
    engine.set("ticket:B", &"B", &SetOptions::new()).await;

    let fetched_ids = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let seen = fetched_ids.clone();
    let ids = ["A".to_string(), "B".to_string(), "C".to_string()];

    let results: Outcome<Vec<Option<String>>> = engine
        .batch_get(
            &ids,
            move |missing: Vec<String>| async move {
                seen.lock().extend(missing.clone());
                Ok(missing)
            },
            |item: &String| item.clone(),
            &options,
        )
        .await;

    assert_eq!(
        results.unwrap(),
        vec![Some("A".to_string()), Some("B".to_string()), Some("C".to_string())]
    );
    assert_eq!(*fetched_ids.lock(), vec!["A".to_string(), "C".to_string()]);
    assert_eq!(engine.invalidate_by_tag(well_known::TICKET).await, 2);
}

// == Binding ==

#[tokio::test]
async fn test_bound_function_caches_by_structured_key() {
    let engine = Arc::new(memory_engine());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let occupancy = Cacheable::new(KeySpec::structured("svc", "Zones", "occupancy", [0]))
        .sync(true)
        .tags([well_known::ZONE])
        .bind(engine.clone(), move |(zone,): (String,)| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<usize, String>(zone.len() * 100)
            }
        });

    assert_eq!(occupancy.call(("north".to_string(),)).await, Ok(500));
    assert_eq!(occupancy.call(("north".to_string(),)).await, Ok(500));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.get::<usize>("svc:Zones:occupancy:north").await, Some(500));

    assert_eq!(engine.invalidate_by_tag(well_known::ZONE).await, 1);
}

#[tokio::test]
async fn test_cacheable_failure_is_returned_and_not_cached() {
    let engine = memory_engine();
    let marker = Cacheable::new("report:{0}");
    let args = CallArgs::new().value("q3");

    let result: Outcome<String> = marker
        .invoke(&engine, &args, || async { Err("renderer offline".to_string()) })
        .await;

    assert!(result.is_err());
    assert!(engine.get::<String>("report:q3").await.is_none());
}

#[tokio::test]
async fn test_engine_from_shared_worker_pool() {
    let workers = WorkerPool::new(1, 4);
    let store = shared_store(Arc::new(MemoryBackend::new()));
    let engine = StrategyEngine::new(store, workers.clone());

    engine.shutdown(Duration::from_millis(10)).await;
    assert!(workers.is_closed());
}
