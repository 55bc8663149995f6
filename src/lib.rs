//! tagcache - Tag-aware, stampede-safe caching engine
//!
//! Sits in front of an expensive data layer. Values live in a shared
//! backend (Redis) with an in-process fallback, carry TTLs and tags, and
//! are read and written through strategies: cache-aside with lock-based
//! stampede protection, write-through, refresh-ahead,
//! stale-while-revalidate, multi-level and batch caching. The `binding`
//! module attaches those strategies to business functions.

pub mod api;
pub mod binding;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod strategy;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{well_known, CacheStore, KeyTtl, SetOptions, StatsSnapshot};
pub use config::Config;
pub use error::{CacheError, Result};
pub use strategy::{
    BatchOptions, L1Config, L2Config, MultiLevelCache, RefreshAheadOptions, StrategyEngine,
    SwrOptions, Ttl,
};
pub use tasks::{spawn_cleanup_task, WorkerPool};
