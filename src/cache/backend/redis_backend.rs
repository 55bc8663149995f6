//! Redis shared backend.
//!
//! Provides cross-process storage and locking through a single
//! auto-reconnecting connection manager. Every command runs under the
//! configured operation timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult, Script};
use tokio::time::timeout;
use tracing::info;

use super::{KeyTtl, SharedBackend};
use crate::error::{CacheError, Result};

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Deletes KEYS[1] only while it still holds ARGV[1].
const DELETE_IF_EQUALS: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Redis-backed shared store.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    op_timeout: Duration,
    release_script: Script,
}

impl RedisBackend {
    /// Connects to `url` and verifies the connection with `PING`.
    ///
    /// # Errors
    /// Returns `BackendUnavailable` if the client cannot be created, the
    /// connection cannot be established, or the ping fails.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self> {
        info!(url = %url, "Connecting to Redis backend");

        let client = Client::open(url).map_err(|e| CacheError::backend("connect", e))?;
        let conn = timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::backend("connect", "timed out"))?
            .map_err(|e| CacheError::backend("connect", e))?;

        let backend = Self {
            conn,
            op_timeout,
            release_script: Script::new(DELETE_IF_EQUALS),
        };
        backend.ping().await?;

        info!("Redis connection established");
        Ok(backend)
    }

    async fn timed<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = RedisResult<T>> + Send,
    ) -> Result<T> {
        timeout(self.op_timeout, fut)
            .await
            .map_err(|_| CacheError::backend(op, "timed out"))?
            .map_err(|e| CacheError::backend(op, e))
    }
}

#[async_trait]
impl SharedBackend for RedisBackend {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = self
            .timed("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::backend("ping", format!("unexpected reply {pong}")))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.timed("get", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        self.timed("set", cmd.query_async::<()>(&mut conn)).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .timed(
                "set_nx",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl.as_millis().max(1) as u64)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        self.timed("del", redis::cmd("DEL").arg(keys).query_async(&mut conn))
            .await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .timed(
                "delete_if_equals",
                self.release_script
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(removed > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        // SCAN instead of KEYS so large keyspaces never block the server
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut found = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .timed(
                    "scan",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        found.sort();
        found.dedup();
        Ok(found)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        self.timed(
            "sadd",
            redis::cmd("SADD").arg(key).arg(member).query_async::<()>(&mut conn),
        )
        .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        self.timed("smembers", redis::cmd("SMEMBERS").arg(key).query_async(&mut conn))
            .await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let mut conn = self.conn.clone();
        let millis: i64 = self
            .timed("pttl", redis::cmd("PTTL").arg(key).query_async(&mut conn))
            .await?;
        Ok(match millis {
            -2 => KeyTtl::Missing,
            ms if ms < 0 => KeyTtl::NoExpiry,
            ms => KeyTtl::Remaining(Duration::from_millis(ms as u64)),
        })
    }

    async fn key_count(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        self.timed("dbsize", redis::cmd("DBSIZE").query_async(&mut conn))
            .await
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        self.timed("flushdb", redis::cmd("FLUSHDB").query_async::<()>(&mut conn))
            .await
    }

    fn backend_type(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis server
    // Run with: docker run -d -p 6379:6379 redis:latest

    const URL: &str = "redis://localhost:6379/1";

    #[tokio::test]
    #[ignore]
    async fn test_redis_set_get_delete() {
        let backend = RedisBackend::connect(URL, Duration::from_secs(1))
            .await
            .unwrap();

        backend
            .set("tagcache:test", "\"v\"", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(
            backend.get("tagcache:test").await.unwrap().as_deref(),
            Some("\"v\"")
        );
        assert_eq!(backend.delete(&["tagcache:test".to_string()]).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_set_if_absent() {
        let backend = RedisBackend::connect(URL, Duration::from_secs(1))
            .await
            .unwrap();
        let ttl = Duration::from_secs(5);

        backend.delete(&["lock:tagcache".to_string()]).await.unwrap();
        assert!(backend.set_if_absent("lock:tagcache", "1", ttl).await.unwrap());
        assert!(!backend.set_if_absent("lock:tagcache", "1", ttl).await.unwrap());
        backend.delete(&["lock:tagcache".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_server_fails() {
        let result = RedisBackend::connect("redis://127.0.0.1:1/0", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(CacheError::BackendUnavailable { .. })));
    }
}
