//! API-key authentication and per-key request/stream limits (§4.10).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::WalletDocError;

static API_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^wd_[A-Za-z0-9]{32}$").expect("static regex is valid"));

pub fn is_valid_api_key(candidate: &str) -> bool {
    API_KEY_PATTERN.is_match(candidate)
}

/// Wallet address length bound (§4.10): base58 Solana addresses are
/// 32-44 characters; this is a cheap shape check, not a base58 decode.
pub fn is_valid_wallet(wallet: &str) -> bool {
    (32..=44).contains(&wallet.chars().count())
}

struct Window {
    started_at: Instant,
    count: AtomicU32,
}

/// Fixed-window per-key rate limiter (default 50 req/min) plus a
/// concurrent-stream gauge (default 10) per key (§4.10, §5).
pub struct KeyLimiter {
    requests_per_minute: u32,
    max_concurrent_streams: u32,
    windows: DashMap<String, Window>,
    active_streams: DashMap<String, Arc<AtomicU32>>,
    total_rate_limited: AtomicU64,
}

impl KeyLimiter {
    pub fn new(requests_per_minute: u32, max_concurrent_streams: u32) -> Self {
        Self {
            requests_per_minute,
            max_concurrent_streams,
            windows: DashMap::new(),
            active_streams: DashMap::new(),
            total_rate_limited: AtomicU64::new(0),
        }
    }

    /// Returns `Ok(())` if `key` may proceed, or a `RateLimited` error
    /// carrying the seconds remaining in the current window otherwise.
    pub fn check_request(&self, key: &str) -> Result<(), WalletDocError> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            started_at: now,
            count: AtomicU32::new(0),
        });

        if now.duration_since(entry.started_at) >= Duration::from_secs(60) {
            entry.started_at = now;
            entry.count.store(0, Ordering::SeqCst);
        }

        let count = entry.count.fetch_add(1, Ordering::SeqCst) + 1;
        if count > self.requests_per_minute {
            self.total_rate_limited.fetch_add(1, Ordering::Relaxed);
            let elapsed = now.duration_since(entry.started_at).as_secs();
            let retry_after_secs = 60u64.saturating_sub(elapsed).max(1);
            return Err(WalletDocError::RateLimited { retry_after_secs });
        }
        Ok(())
    }

    /// Reserves a streaming slot for `key`, returning a guard that frees it
    /// on drop. `None` means the per-key concurrent-stream cap was hit.
    pub fn try_reserve_stream(&self, key: &str) -> Option<StreamGuard> {
        let counter = self
            .active_streams
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .clone();

        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current >= self.max_concurrent_streams {
                return None;
            }
            match counter.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(StreamGuard { counter }),
                Err(observed) => current = observed,
            }
        }
    }

    pub fn rate_limited_total(&self) -> u64 {
        self.total_rate_limited.load(Ordering::Relaxed)
    }
}

/// RAII handle for a reserved streaming slot; decrements the per-key
/// active-stream counter when the stream ends (client disconnect, complete,
/// or error).
pub struct StreamGuard {
    counter: Arc<AtomicU32>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_pattern_matches_spec_shape() {
        assert!(is_valid_api_key("wd_abcdEFGH0123abcdEFGH0123abcdEFGH"));
        assert!(!is_valid_api_key("wd_short"));
        assert!(!is_valid_api_key("xx_abcdEFGH0123abcdEFGH0123abcdEFGH"));
    }

    #[test]
    fn wallet_length_bounds() {
        assert!(is_valid_wallet(&"a".repeat(32)));
        assert!(is_valid_wallet(&"a".repeat(44)));
        assert!(!is_valid_wallet(&"a".repeat(31)));
        assert!(!is_valid_wallet(&"a".repeat(45)));
    }

    #[test]
    fn request_limiter_trips_after_budget() {
        let limiter = KeyLimiter::new(2, 10);
        assert!(limiter.check_request("k1").is_ok());
        assert!(limiter.check_request("k1").is_ok());
        assert!(limiter.check_request("k1").is_err());
    }

    #[test]
    fn stream_reservation_caps_concurrency() {
        let limiter = KeyLimiter::new(100, 1);
        let first = limiter.try_reserve_stream("k1");
        assert!(first.is_some());
        assert!(limiter.try_reserve_stream("k1").is_none());
        drop(first);
        assert!(limiter.try_reserve_stream("k1").is_some());
    }
}
