use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::position::PositionPnL;

/// Default schema version for the positions endpoint (§4.10, §9 open
/// question — gated behind `PRICE_SOL_SPOT_ONLY` per the "BETA" caveat).
pub const POSITIONS_SCHEMA_VERSION: &str = "v0.8.0-prices";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_value_usd: Option<Decimal>,
    pub total_cost_basis_usd: Decimal,
    pub total_unrealized_pnl_usd: Option<Decimal>,
    pub total_unrealized_pnl_pct: Option<Decimal>,
    pub stale_price_count: u32,
    pub position_count: u32,
}

/// `wallet`, `schema_version`, `timestamp`, `positions[]`, aggregate
/// summary, plus hints pointing clients to price-refresh endpoints (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub wallet: String,
    pub schema_version: String,
    pub timestamp: DateTime<Utc>,
    pub positions: Vec<PositionPnL>,
    pub summary: PortfolioSummary,
    pub price_sources: HashMap<String, String>,
}

/// Wrapper adding cache-freshness metadata (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSnapshot<T> {
    pub value: T,
    pub cached_at: DateTime<Utc>,
    pub ttl_seconds: i64,
    pub schema_version: String,
}

impl<T> CachedSnapshot<T> {
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.cached_at).num_seconds().max(0)
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age_seconds(now) > self.ttl_seconds
    }
}
