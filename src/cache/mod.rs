//! Cache Module
//!
//! Storage layer of the engine: the shared backend with local fallback, tag
//! memberships, advisory locks and statistics.

mod backend;
mod entry;
mod local;
mod lock;
mod order;
mod pattern;
mod stats;
mod store;
mod tags;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use backend::{connect, KeyTtl, MemoryBackend, RedisBackend, SharedBackend};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use local::LocalStore;
pub use lock::{lock_key, LockManager, LockWait, LOCK_PREFIX};
pub use order::InsertionOrder;
pub use pattern::KeyPattern;
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{CacheStore, SetOptions};
pub use tags::{tag_key, well_known, TagIndex, TAG_PREFIX};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 512;
