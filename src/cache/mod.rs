//! Two-tier Cache Layer (C8, §4.8): a distributed KV primary (Redis, or a
//! null stand-in when unconfigured) backed by an in-process LRU fallback.
//! Implements stale-while-refresh semantics with per-key refresh
//! coalescing, grounded on the teacher's `cache::manager::CacheManager`
//! (TTL + LRU eviction + metrics) generalized to a two-tier, async,
//! serialized-blob store.

pub mod distributed;
pub mod keys;
mod lru;

pub use distributed::{DistributedCache, NullDistributedCache, RedisCache};
pub use lru::LruTtlCache;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::domain::CachedSnapshot;
use crate::error::WalletDocResult;

#[derive(Debug, Default)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub stale_serves: u64,
    pub refresh_triggers: u64,
    pub refresh_errors: u64,
    pub lru_size: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_serves: AtomicU64,
    refresh_triggers: AtomicU64,
    refresh_errors: AtomicU64,
}

/// A value read from the cache, with freshness metadata attached (§3
/// `CachedSnapshot`).
#[derive(Debug, Clone)]
pub struct CachedOutcome<T> {
    pub value: T,
    pub stale: bool,
    pub age_seconds: i64,
    pub schema_version: String,
}

struct Inner {
    lru: LruTtlCache,
    distributed: Arc<dyn DistributedCache>,
    inflight: DashSet<String>,
    counters: Counters,
}

/// Shared, cheaply-cloneable handle to the two-tier cache.
#[derive(Clone)]
pub struct CacheLayer {
    inner: Arc<Inner>,
}

impl CacheLayer {
    pub fn new(lru_capacity: usize, distributed: Arc<dyn DistributedCache>) -> Self {
        Self {
            inner: Arc::new(Inner {
                lru: LruTtlCache::new(lru_capacity),
                distributed,
                inflight: DashSet::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub fn null(lru_capacity: usize) -> Self {
        Self::new(lru_capacity, Arc::new(NullDistributedCache))
    }

    /// Reads `key`. Tries the distributed tier first (so multiple process
    /// instances observe the same writes), falling back to the in-process
    /// LRU. A hit in either tier is deserialized as `CachedSnapshot<T>` and
    /// staleness is derived from its own `cached_at`/`ttl_seconds` (§3, §4.8).
    pub async fn get<T>(&self, key: &str) -> Option<CachedOutcome<T>>
    where
        T: DeserializeOwned,
    {
        let raw = match self.inner.distributed.get(key).await {
            Ok(Some(raw)) => Some(raw),
            Ok(None) => self.inner.lru.get(key).map(|(v, _)| v),
            Err(e) => {
                warn!(error = %e, key, "distributed cache read failed, falling back to LRU");
                self.inner.lru.get(key).map(|(v, _)| v)
            }
        };

        let Some(raw) = raw else {
            self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let parsed: CachedSnapshot<T> = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, key, "failed to deserialize cache entry, treating as miss");
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let now = Utc::now();
        let stale = parsed.is_stale(now);
        let age_seconds = parsed.age_seconds(now);

        self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
        if stale {
            self.inner.counters.stale_serves.fetch_add(1, Ordering::Relaxed);
        }

        Some(CachedOutcome {
            value: parsed.value,
            stale,
            age_seconds,
            schema_version: parsed.schema_version,
        })
    }

    /// Writes `value` into both tiers, wrapped in a `CachedSnapshot` stamped
    /// with the current time so later reads can compute staleness.
    pub async fn put<T>(&self, key: &str, value: &T, ttl: Duration, schema_version: &str)
    where
        T: Serialize,
    {
        let wrapped = CachedSnapshot {
            value,
            cached_at: Utc::now(),
            ttl_seconds: ttl.as_secs() as i64,
            schema_version: schema_version.to_string(),
        };
        let raw = match serde_json::to_string(&wrapped) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, key, "failed to serialize cache entry, skipping write");
                return;
            }
        };

        if let Err(e) = self.inner.distributed.set(key, raw.clone(), ttl).await {
            warn!(error = %e, key, "distributed cache write failed");
        }
        self.inner.lru.put(key.to_string(), raw, ttl);
    }

    /// Fetch-or-refresh with stale-while-refresh semantics (§4.8, S6):
    /// - fresh hit: return immediately.
    /// - stale hit: return the stale value immediately, and if no refresh is
    ///   already in flight for this key, spawn one in the background.
    /// - miss: no prior value to serve, so run `refresh` inline.
    pub async fn get_or_refresh<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        schema_version: &'static str,
        refresh: F,
    ) -> WalletDocResult<CachedOutcome<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = WalletDocResult<T>> + Send + 'static,
    {
        match self.get::<T>(key).await {
            Some(outcome) if !outcome.stale => Ok(outcome),
            Some(outcome) => {
                self.maybe_spawn_refresh(key.to_string(), ttl, schema_version, refresh);
                Ok(outcome)
            }
            None => {
                let value = refresh().await?;
                self.put(key, &value, ttl, schema_version).await;
                Ok(CachedOutcome {
                    value,
                    stale: false,
                    age_seconds: 0,
                    schema_version: schema_version.to_string(),
                })
            }
        }
    }

    fn maybe_spawn_refresh<T, F, Fut>(
        &self,
        key: String,
        ttl: Duration,
        schema_version: &'static str,
        refresh: F,
    ) where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = WalletDocResult<T>> + Send + 'static,
    {
        if !self.inner.inflight.insert(key.clone()) {
            // Another task already owns the refresh for this key (§4.8,
            // §5 "per-key in-flight marker").
            return;
        }
        self.inner.counters.refresh_triggers.fetch_add(1, Ordering::Relaxed);

        let this = self.clone();
        tokio::spawn(async move {
            match refresh().await {
                Ok(value) => {
                    this.put(&key, &value, ttl, schema_version).await;
                }
                Err(e) => {
                    warn!(error = %e, key, "background cache refresh failed, stale entry kept");
                    this.inner.counters.refresh_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            this.inner.inflight.remove(&key);
        });
    }

    /// Runs `refresh` unconditionally, bypassing any cached value, and
    /// writes the result into both tiers (§4.8: "explicit `?refresh=true`
    /// bypasses cache entirely for one request").
    pub async fn bypass<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        schema_version: &'static str,
        refresh: F,
    ) -> WalletDocResult<CachedOutcome<T>>
    where
        T: Serialize + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = WalletDocResult<T>>,
    {
        let value = refresh().await?;
        self.put(key, &value, ttl, schema_version).await;
        Ok(CachedOutcome {
            value,
            stale: false,
            age_seconds: 0,
            schema_version: schema_version.to_string(),
        })
    }

    /// Removes every `pos:v1:*` entry for `wallet` from both tiers (§4.8:
    /// "any new trade observed for a wallet ... invalidates all `pos:v1:*`
    /// keys for that wallet").
    pub async fn invalidate_wallet_positions(&self, wallet: &str) {
        let glob = keys::wallet_positions_glob(wallet);
        self.inner.lru.remove_matching(&glob);
        if let Err(e) = self.inner.distributed.delete_matching(&glob).await {
            warn!(error = %e, wallet, "distributed invalidation failed");
        }
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        let lru_metrics = self.inner.lru.metrics();
        CacheMetricsSnapshot {
            hits: self.inner.counters.hits.load(Ordering::Relaxed),
            misses: self.inner.counters.misses.load(Ordering::Relaxed),
            evictions: lru_metrics.evictions,
            stale_serves: self.inner.counters.stale_serves.load(Ordering::Relaxed),
            refresh_triggers: self.inner.counters.refresh_triggers.load(Ordering::Relaxed),
            refresh_errors: self.inner.counters.refresh_errors.load(Ordering::Relaxed),
            lru_size: self.inner.lru.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as O};

    #[tokio::test]
    async fn miss_runs_refresh_inline_and_caches_result() {
        let cache = CacheLayer::null(100);
        let result: CachedOutcome<String> = cache
            .get_or_refresh("k1", Duration::from_secs(60), "v1", || async {
                Ok("computed".to_string())
            })
            .await
            .unwrap();
        assert_eq!(result.value, "computed");
        assert!(!result.stale);

        let cached: CachedOutcome<String> = cache.get("k1").await.unwrap();
        assert_eq!(cached.value, "computed");
        assert!(!cached.stale);
    }

    #[tokio::test]
    async fn stale_hit_triggers_exactly_one_background_refresh() {
        let cache = CacheLayer::null(100);
        cache
            .put(
                "k2",
                &"old".to_string(),
                Duration::from_secs(0), // immediately stale
                "v1",
            )
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let calls = Arc::new(AtomicU32::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();

        let first: CachedOutcome<String> = cache
            .get_or_refresh("k2", Duration::from_secs(60), "v1", move || async move {
                c1.fetch_add(1, O::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("new".to_string())
            })
            .await
            .unwrap();
        assert_eq!(first.value, "old");
        assert!(first.stale);

        let second: CachedOutcome<String> = cache
            .get_or_refresh("k2", Duration::from_secs(60), "v1", move || async move {
                c2.fetch_add(1, O::SeqCst);
                Ok("new2".to_string())
            })
            .await
            .unwrap();
        assert_eq!(second.value, "old");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(O::SeqCst), 1, "second refresh must coalesce into the first");

        let refreshed: CachedOutcome<String> = cache.get("k2").await.unwrap();
        assert_eq!(refreshed.value, "new");
    }

    #[tokio::test]
    async fn invalidate_wallet_positions_clears_both_keys() {
        let cache = CacheLayer::null(100);
        cache
            .put(&keys::snapshot_key("wallet1"), &"snap".to_string(), Duration::from_secs(60), "v1")
            .await;
        cache
            .put(
                &keys::position_key("wallet1", "mintX"),
                &"pos".to_string(),
                Duration::from_secs(60),
                "v1",
            )
            .await;

        cache.invalidate_wallet_positions("wallet1").await;

        assert!(cache.get::<String>(&keys::snapshot_key("wallet1")).await.is_none());
        assert!(cache.get::<String>(&keys::position_key("wallet1", "mintX")).await.is_none());
    }
}
