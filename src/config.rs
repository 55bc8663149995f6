//! Configuration Module
//!
//! Handles loading and managing engine configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared backend URL. `None` runs local-only, `memory://` uses the in-process backend
    pub redis_url: Option<String>,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Maximum number of entries the local fallback map can hold
    pub max_local_entries: usize,
    /// HTTP admin server port
    pub server_port: u16,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Per-operation timeout against the shared backend, in milliseconds
    pub backend_timeout_ms: u64,
    /// Lock TTL used for stampede protection, in milliseconds
    pub lock_ttl_ms: u64,
    /// Remaining TTL fraction under which refresh-ahead kicks in
    pub refresh_threshold: f64,
    /// Maximum concurrently running background refreshes
    pub worker_concurrency: usize,
    /// Maximum queued plus running background refreshes
    pub worker_max_pending: usize,
    /// How long shutdown waits for in-flight background work, in seconds
    pub shutdown_grace_secs: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_URL` - Shared backend URL (default: unset, local-only)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `MAX_LOCAL_ENTRIES` - Local fallback capacity (default: 10000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Expiry sweep frequency in seconds (default: 1)
    /// - `BACKEND_TIMEOUT_MS` - Shared backend op timeout (default: 500)
    /// - `LOCK_TTL_MS` - Stampede lock TTL (default: 10000)
    /// - `REFRESH_THRESHOLD` - Refresh-ahead threshold (default: 0.2)
    /// - `WORKER_CONCURRENCY` - Background refresh concurrency (default: 8)
    /// - `WORKER_MAX_PENDING` - Background refresh backlog (default: 256)
    /// - `SHUTDOWN_GRACE_SECS` - Shutdown grace period (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            max_local_entries: parse_var("MAX_LOCAL_ENTRIES")
                .unwrap_or(defaults.max_local_entries),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            backend_timeout_ms: parse_var("BACKEND_TIMEOUT_MS")
                .unwrap_or(defaults.backend_timeout_ms),
            lock_ttl_ms: parse_var("LOCK_TTL_MS").unwrap_or(defaults.lock_ttl_ms),
            refresh_threshold: parse_var::<f64>("REFRESH_THRESHOLD")
                .filter(|t| (0.0..=1.0).contains(t))
                .unwrap_or(defaults.refresh_threshold),
            worker_concurrency: parse_var("WORKER_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.worker_concurrency),
            worker_max_pending: parse_var("WORKER_MAX_PENDING")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.worker_max_pending),
            shutdown_grace_secs: parse_var("SHUTDOWN_GRACE_SECS")
                .unwrap_or(defaults.shutdown_grace_secs),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: None,
            default_ttl: 3600,
            max_local_entries: 10_000,
            server_port: 3000,
            cleanup_interval: 1,
            backend_timeout_ms: 500,
            lock_ttl_ms: 10_000,
            refresh_threshold: 0.2,
            worker_concurrency: 8,
            worker_max_pending: 256,
            shutdown_grace_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.redis_url.is_none());
        assert_eq!(config.default_ttl, 3600);
        assert_eq!(config.max_local_entries, 10_000);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 1);
        assert_eq!(config.refresh_threshold, 0.2);
        assert_eq!(config.lock_ttl(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "REDIS_URL",
            "DEFAULT_TTL",
            "MAX_LOCAL_ENTRIES",
            "SERVER_PORT",
            "CLEANUP_INTERVAL",
            "REFRESH_THRESHOLD",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert!(config.redis_url.is_none());
        assert_eq!(config.default_ttl, 3600);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 1);
        assert_eq!(config.refresh_threshold, 0.2);
    }
}
