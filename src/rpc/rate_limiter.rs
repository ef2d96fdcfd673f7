//! Global token-bucket rate limiter gating the upstream RPC client (§4.1,
//! §5). Grounded on the teacher's `rpc::rate_limiter` manager, reduced to
//! the single-provider shape this service needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct TokenBucket {
    capacity: f64,
    tokens: Mutex<f64>,
    refill_per_sec: f64,
    last_refill: Mutex<Instant>,
    permits_issued: AtomicU64,
}

impl TokenBucket {
    pub fn new(rps: u32) -> Self {
        Self {
            capacity: rps as f64,
            tokens: Mutex::new(rps as f64),
            refill_per_sec: rps as f64,
            last_refill: Mutex::new(Instant::now()),
            permits_issued: AtomicU64::new(0),
        }
    }

    /// Blocks until one token is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            {
                let mut tokens = self.tokens.lock().await;
                let mut last = self.last_refill.lock().await;
                let elapsed = last.elapsed().as_secs_f64();
                *tokens = (*tokens + elapsed * self.refill_per_sec).min(self.capacity);
                *last = Instant::now();

                if *tokens >= 1.0 {
                    *tokens -= 1.0;
                    self.permits_issued.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn permits_issued(&self) -> u64 {
        self.permits_issued.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_up_to_capacity_immediately() {
        let bucket = TokenBucket::new(5);
        for _ in 0..5 {
            bucket.acquire().await;
        }
        assert_eq!(bucket.permits_issued(), 5);
    }
}
