//! Distributed KV primary tier (§4.8). A thin trait over Redis so the
//! cache layer degrades to LRU-only when `DISTRIBUTED_CACHE_URL` is unset,
//! matching §6.1's "absent ⇒ LRU-only".

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

use crate::error::{WalletDocError, WalletDocResult};

#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> WalletDocResult<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> WalletDocResult<()>;
    async fn delete(&self, key: &str) -> WalletDocResult<()>;
    /// Best-effort scan-and-delete over a `*`-glob pattern (redis `SCAN`
    /// with `MATCH`), used by the §4.8 wallet-scoped invalidation rule.
    async fn delete_matching(&self, glob: &str) -> WalletDocResult<()>;
}

pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> WalletDocResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| WalletDocError::Internal(format!("invalid redis url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| WalletDocError::Internal(format!("redis connection failed: {e}")))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn get(&self, key: &str) -> WalletDocResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key)
            .await
            .map_err(|e| WalletDocError::Internal(format!("redis get failed: {e}")))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> WalletDocResult<()> {
        let mut conn = self.manager.clone();
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| WalletDocError::Internal(format!("redis set failed: {e}")))
    }

    async fn delete(&self, key: &str) -> WalletDocResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| WalletDocError::Internal(format!("redis del failed: {e}")))
    }

    async fn delete_matching(&self, glob: &str) -> WalletDocResult<()> {
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(glob)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| WalletDocError::Internal(format!("redis scan failed: {e}")))?;

            if !keys.is_empty() {
                if let Err(e) = conn.del::<_, ()>(keys).await {
                    warn!(error = %e, "redis scan-delete batch failed");
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(())
    }
}

/// Used when `DISTRIBUTED_CACHE_URL` is unset; every call is a clean miss
/// so the cache layer falls through to the LRU tier unconditionally.
pub struct NullDistributedCache;

#[async_trait]
impl DistributedCache for NullDistributedCache {
    async fn get(&self, _key: &str) -> WalletDocResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> WalletDocResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> WalletDocResult<()> {
        Ok(())
    }

    async fn delete_matching(&self, _glob: &str) -> WalletDocResult<()> {
        Ok(())
    }
}
