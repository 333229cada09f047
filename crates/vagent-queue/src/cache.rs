//! Fabric-backed memoization.
//!
//! Explicit `get_or_compute` calls replace the original's
//! decorator-based cache helpers; mutation paths call
//! `invalidate_by_pattern` with the key prefixes they touch.

use std::future::Future;
use std::time::Duration;

use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::QueueResult;

/// Cache capability over the Redis fabric.
#[derive(Clone)]
pub struct Cacher {
    client: redis::Client,
    key_prefix: String,
}

impl Cacher {
    /// Create a new cacher. Keys live under `{prefix}:cache:`.
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key_prefix: prefix.into(),
        })
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}:cache:{}", self.key_prefix, key)
    }

    /// Fetch a cached value, or compute and store it under a TTL.
    ///
    /// Factory errors pass through untouched; nothing is cached on
    /// failure. A poisoned cache entry is treated as a miss.
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        factory: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let redis_key = self.cache_key(key);

        if let Ok(mut conn) = self.client.get_multiplexed_async_connection().await {
            let cached: Option<String> = conn.get(&redis_key).await.unwrap_or(None);
            if let Some(payload) = cached {
                match serde_json::from_str::<T>(&payload) {
                    Ok(value) => {
                        debug!(key = %key, "Cache hit");
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                        conn.del::<_, ()>(&redis_key).await.ok();
                    }
                }
            }
        }

        let value = factory().await?;

        if let Ok(payload) = serde_json::to_string(&value) {
            if let Ok(mut conn) = self.client.get_multiplexed_async_connection().await {
                conn.set_ex::<_, _, ()>(&redis_key, payload, ttl.as_secs())
                    .await
                    .ok();
            }
        }

        Ok(value)
    }

    /// Delete every cache entry whose key starts with `prefix`.
    /// Returns the number of deleted entries.
    pub async fn invalidate_by_pattern(&self, prefix: &str) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let match_pattern = format!("{}*", self.cache_key(prefix));

        let mut deleted = 0u64;
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&match_pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            for key in &keys {
                let removed: i64 = conn.del(key).await?;
                deleted += removed as u64;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        if deleted > 0 {
            debug!(prefix = %prefix, count = deleted, "Invalidated cache entries");
        }
        Ok(deleted)
    }
}
