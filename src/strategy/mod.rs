//! Strategy Module
//!
//! Caching algorithms composed from the storage layer.

mod engine;
mod options;
mod tiered;

pub use engine::StrategyEngine;
pub use options::{BatchOptions, RefreshAheadOptions, SwrOptions, Ttl, DEFAULT_REFRESH_THRESHOLD};
pub use tiered::{L1Config, L2Config, MultiLevelCache, TierStats};
