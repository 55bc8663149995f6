//! Property-Based Tests for Cache Module
//!
//! Uses proptest to verify storage invariants over arbitrary operation sequences.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, KeyPattern, LocalStore, MemoryBackend, SetOptions, TagIndex};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
/// Generates valid cache keys with a small set of prefixes
fn valid_key_strategy() -> impl Strategy<Value = String> {
    ("(session|user|festival)", "[a-z0-9]{1,16}").prop_map(|(prefix, id)| format!("{prefix}:{id}"))
}

/// Generates JSON-encodable values
fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,128}"
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Round-trip: a value read back before expiry equals the value written.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        let store = CacheStore::local(TEST_MAX_ENTRIES, TEST_TTL);

        let retrieved = tokio_test::block_on(async {
            store.set(&key, &value, &SetOptions::new()).await;
            store.get::<String>(&key).await
        });

        prop_assert_eq!(retrieved, Some(value), "Round-trip value mismatch");
    }

    // The local map agrees with a plain HashMap model for any op sequence,
    // and its hit/miss counters match the observed outcomes.
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let store = CacheStore::local(TEST_MAX_ENTRIES, TEST_TTL);
        let mut model: HashMap<String, String> = HashMap::new();
        let mut expected_hits = 0u64;
        let mut expected_misses = 0u64;

        tokio_test::block_on(async {
            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        store.set(&key, &value, &SetOptions::new()).await;
                        model.insert(key, value);
                    }
                    CacheOp::Get { key } => {
                        let got = store.get::<String>(&key).await;
                        match model.get(&key) {
                            Some(v) => {
                                expected_hits += 1;
                                assert_eq!(got.as_ref(), Some(v));
                            }
                            None => {
                                expected_misses += 1;
                                assert!(got.is_none());
                            }
                        }
                    }
                    CacheOp::Delete { key } => {
                        let removed = store.delete(&key).await;
                        assert_eq!(removed, model.remove(&key).is_some());
                    }
                }
            }
        });

        let stats = tokio_test::block_on(store.stats());
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.key_count, model.len(), "Key count mismatch");
    }

    // Pattern deletion removes exactly the matching keys.
    #[test]
    fn prop_pattern_delete_only_matching(
        keys in prop::collection::hash_set(valid_key_strategy(), 1..40)
    ) {
        let mut store = LocalStore::new(TEST_MAX_ENTRIES);
        for key in &keys {
            store.set(key, "1".to_string(), Some(TEST_TTL));
        }

        let pattern = KeyPattern::new("session:*").unwrap();
        let expected = keys.iter().filter(|k| k.starts_with("session:")).count();

        prop_assert_eq!(store.delete_matching(&pattern).len(), expected);
        for key in &keys {
            prop_assert_eq!(store.get(key).is_some(), !key.starts_with("session:"));
        }
    }

    // The local map never holds more than its capacity.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec(
            (valid_key_strategy(), valid_value_strategy()),
            1..200
        )
    ) {
        let max_entries = 50;
        let mut store = LocalStore::new(max_entries);

        for (key, value) in entries {
            store.set(&key, value, Some(TEST_TTL));
            prop_assert!(
                store.len() <= max_entries,
                "Store size {} exceeds max {}",
                store.len(),
                max_entries
            );
        }
    }

    // Tag invalidation removes every tagged key and nothing else, and the
    // count equals the number of live tagged keys.
    #[test]
    fn prop_tag_invalidation_exact(
        tagged in prop::collection::hash_set("[a-z]{1,8}", 1..20),
        untagged in prop::collection::hash_set("[a-z]{1,8}", 0..20)
    ) {
        let store = CacheStore::with_backend(Arc::new(MemoryBackend::new()), TEST_MAX_ENTRIES, TEST_TTL);
        let with_tag = SetOptions::new().tags(["festival"]);

        let removed = tokio_test::block_on(async {
            for id in &tagged {
                store.set(&format!("festival:{id}"), id, &with_tag).await;
            }
            for id in &untagged {
                store.set(&format!("user:{id}"), id, &SetOptions::new()).await;
            }
            TagIndex::new(&store).invalidate_tag("festival").await
        });

        prop_assert_eq!(removed, tagged.len());
        for id in &untagged {
            let still_there = tokio_test::block_on(store.get::<String>(&format!("user:{id}")));
            prop_assert_eq!(still_there.as_deref(), Some(id.as_str()));
        }
    }
}

// Fewer cases for time-sensitive TTL checks
proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    // After its TTL elapses, an entry reads as absent.
    #[test]
    fn prop_ttl_expiration_behavior(
        key in valid_key_strategy(),
        value in valid_value_strategy()
    ) {
        let mut store = LocalStore::new(TEST_MAX_ENTRIES);
        store.set(&key, value, Some(Duration::from_millis(100)));

        prop_assert!(store.get(&key).is_some(), "Entry should exist before TTL expires");

        std::thread::sleep(Duration::from_millis(150));

        prop_assert!(store.get(&key).is_none(), "Entry should be absent after TTL expires");
    }
}

// == Concurrent Operation Correctness ==
proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    // Concurrent readers only ever observe a complete value that some
    // writer stored for that key.
    #[test]
    fn prop_concurrent_operation_correctness(
        operations in prop::collection::vec(cache_op_strategy(), 10..50)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let store = Arc::new(CacheStore::with_backend(
                Arc::new(MemoryBackend::new()),
                TEST_MAX_ENTRIES,
                TEST_TTL,
            ));

            let written: HashMap<String, Vec<String>> = operations.iter().fold(
                HashMap::new(),
                |mut acc, op| {
                    if let CacheOp::Set { key, value } = op {
                        acc.entry(key.clone()).or_default().push(value.clone());
                    }
                    acc
                },
            );
            let written = Arc::new(written);

            let mut handles = vec![];
            for op in operations {
                let store = Arc::clone(&store);
                let written = Arc::clone(&written);
                handles.push(tokio::spawn(async move {
                    match op {
                        CacheOp::Set { key, value } => {
                            store.set(&key, &value, &SetOptions::new()).await;
                            Ok(())
                        }
                        CacheOp::Get { key } => match store.get::<String>(&key).await {
                            Some(value) if !written.get(&key).is_some_and(|vs| vs.contains(&value)) => {
                                Err(format!("Read unexpected value '{value}' for key '{key}'"))
                            }
                            _ => Ok(()),
                        },
                        CacheOp::Delete { key } => {
                            store.delete(&key).await;
                            Ok(())
                        }
                    }
                }));
            }

            for handle in handles {
                let result = handle.await.expect("Task should not panic");
                prop_assert!(result.is_ok(), "Concurrent operation failed: {:?}", result);
            }

            let stats = store.stats().await;
            prop_assert!(
                (0.0..=1.0).contains(&stats.hit_rate),
                "Hit rate should be between 0 and 1, got {}",
                stats.hit_rate
            );
            Ok(())
        })?;
    }
}
