//! SOL/USD spot price, fetched from Jupiter's public price API and cached
//! for a short, configurable TTL (§4.5 item 2). Mirrors the request/TTL
//! shape of the teacher's Jupiter-backed SOL price helper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;

const JUPITER_PRICE_URL: &str = "https://lite-api.jup.ag/price/v2?ids=So11111111111111111111111111111111111111112";

#[derive(Debug, Deserialize)]
struct JupiterPriceResponse {
    data: std::collections::HashMap<String, JupiterPriceEntry>,
}

#[derive(Debug, Deserialize)]
struct JupiterPriceEntry {
    price: String,
}

struct Cached {
    price: Decimal,
    fetched_at: Instant,
}

pub struct SolSpotProvider {
    http: reqwest::Client,
    ttl: Duration,
    cached: Mutex<Option<Cached>>,
}

impl SolSpotProvider {
    pub fn new(http: reqwest::Client, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            http,
            ttl,
            cached: Mutex::new(None),
        })
    }

    /// Returns the cached SOL/USD price if younger than `ttl`, else fetches
    /// a fresh one. A failed fetch falls back to a stale cached value when
    /// one exists, otherwise propagates the error.
    pub async fn current_price(&self) -> crate::error::WalletDocResult<Decimal> {
        {
            let guard = self.cached.lock().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.price);
                }
            }
        }

        match self.fetch().await {
            Ok(price) => {
                let mut guard = self.cached.lock().await;
                *guard = Some(Cached {
                    price,
                    fetched_at: Instant::now(),
                });
                Ok(price)
            }
            Err(e) => {
                let guard = self.cached.lock().await;
                match guard.as_ref() {
                    Some(cached) => Ok(cached.price),
                    None => Err(e),
                }
            }
        }
    }

    async fn fetch(&self) -> crate::error::WalletDocResult<Decimal> {
        let resp = self.http.get(JUPITER_PRICE_URL).send().await?;
        let parsed: JupiterPriceResponse = resp.json().await?;
        let entry = parsed
            .data
            .get(crate::domain::SOL_MINT)
            .ok_or_else(|| crate::error::WalletDocError::UpstreamFailure("SOL price missing from response".into()))?;
        entry
            .price
            .parse::<Decimal>()
            .map_err(|_| crate::error::WalletDocError::UpstreamFailure("malformed SOL price".into()))
    }
}
