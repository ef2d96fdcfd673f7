use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::trade::Confidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostBasisConfidence {
    Known,
    Unknown,
}

/// Derived view over open lots for one (wallet, mint) (§3). Destroyed when
/// `balance` hits zero; a subsequent BUY opens a fresh position with a new
/// `position_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub wallet: String,
    pub mint: String,
    pub balance: Decimal,
    pub cost_basis_usd: Decimal,
    pub cost_basis_confidence: CostBasisConfidence,
    pub opened_at: i64,
    pub last_trade_at: i64,
    /// Set once any SELL against this (wallet, mint) consumed more than the
    /// available lots could cover (§4.6 over-sell policy).
    pub has_uncovered_sells: bool,
}

impl Position {
    /// `position_id = first8(wallet)::first8(mint)::opened_at_unix` (§3).
    pub fn make_id(wallet: &str, mint: &str, opened_at: i64) -> String {
        let w: String = wallet.chars().take(8).collect();
        let m: String = mint.chars().take(8).collect();
        format!("{w}::{m}::{opened_at}")
    }
}

/// A Position joined with a current price (§3, C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionPnL {
    #[serde(flatten)]
    pub position: Position,
    pub current_price_usd: Option<Decimal>,
    pub current_value_usd: Option<Decimal>,
    pub unrealized_pnl_usd: Option<Decimal>,
    pub unrealized_pnl_pct: Option<Decimal>,
    pub price_confidence: Confidence,
    pub price_age_seconds: Option<i64>,
    pub price_source: Option<String>,
}
