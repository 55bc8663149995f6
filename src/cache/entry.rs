//! Local map record: an encoded payload with its deadline.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_millis() as u64)
        .unwrap_or_default()
}

// == Cache Entry ==
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// JSON payload exactly as the store received it
    pub value: String,
    /// Write time, epoch ms
    pub written_at: u64,
    /// Deadline in epoch ms; `None` keeps the entry until deleted
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    pub fn new(value: String, ttl: Option<Duration>) -> Self {
        let written_at = current_timestamp_ms();
        Self {
            value,
            written_at,
            expires_at: ttl.map(|ttl| written_at.saturating_add(ttl.as_millis() as u64)),
        }
    }

    /// Dead from its deadline onwards, inclusive.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| current_timestamp_ms() >= deadline)
    }

    /// Time left before the deadline; zero once passed, `None` without one.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at.map(|deadline| {
            Duration::from_millis(deadline.saturating_sub(current_timestamp_ms()))
        })
    }
}
