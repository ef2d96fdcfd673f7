//! Unrealized P&L Calculator (C7, §4.7). Joins open Positions with current
//! prices from the Price Oracle, producing `PositionPnL` entries and the
//! aggregate `PortfolioSummary` totals.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::{Confidence, Position, PositionPnL, PortfolioSummary};
use crate::pricing::PriceOracle;

/// Age budgets from §4.7: a `high`-confidence price older than this is
/// treated as if unavailable for valuation purposes; `est` gets a looser
/// budget. `stale` prices are already bounded by the oracle's own
/// `stale_ttl_seconds` and pass through untouched, which is what makes them
/// `stale` rather than `unavailable` in the first place.
const HIGH_CONFIDENCE_BUDGET_SECS: i64 = 60;
const EST_CONFIDENCE_BUDGET_SECS: i64 = 300;

pub struct UnrealizedCalculator {
    oracle: Arc<PriceOracle>,
}

impl UnrealizedCalculator {
    pub fn new(oracle: Arc<PriceOracle>) -> Self {
        Self { oracle }
    }

    /// Prices every open Position, producing a `PositionPnL` per entry.
    /// Order is preserved from the input slice.
    pub async fn price_positions(&self, positions: Vec<Position>) -> Vec<PositionPnL> {
        let mut out = Vec::with_capacity(positions.len());
        for position in positions {
            out.push(self.price_one(position).await);
        }
        out
    }

    async fn price_one(&self, position: Position) -> PositionPnL {
        let quote = self.oracle.current_price(&position.mint).await;

        let quote = quote.filter(|q| match q.confidence {
            Confidence::High => q.age_seconds <= HIGH_CONFIDENCE_BUDGET_SECS,
            Confidence::Est => q.age_seconds <= EST_CONFIDENCE_BUDGET_SECS,
            Confidence::Stale | Confidence::Unavailable => true,
        });

        match quote {
            Some(q) => {
                let current_value_usd = q.price_usd * position.balance;
                let unrealized_pnl_usd = current_value_usd - position.cost_basis_usd;
                let unrealized_pnl_pct = if position.cost_basis_usd.is_zero() {
                    None
                } else {
                    Some(unrealized_pnl_usd / position.cost_basis_usd)
                };
                PositionPnL {
                    position,
                    current_price_usd: Some(q.price_usd),
                    current_value_usd: Some(current_value_usd),
                    unrealized_pnl_usd: Some(unrealized_pnl_usd),
                    unrealized_pnl_pct,
                    price_confidence: q.confidence,
                    price_age_seconds: Some(q.age_seconds),
                    price_source: Some(q.source),
                }
            }
            None => PositionPnL {
                position,
                current_price_usd: None,
                current_value_usd: None,
                unrealized_pnl_usd: None,
                unrealized_pnl_pct: None,
                price_confidence: Confidence::Unavailable,
                price_age_seconds: None,
                price_source: None,
            },
        }
    }

    /// Aggregate totals for the `PortfolioSnapshot.summary` field (§4.7).
    pub fn summarize(positions: &[PositionPnL]) -> PortfolioSummary {
        let total_cost_basis_usd: Decimal = positions.iter().map(|p| p.position.cost_basis_usd).sum();

        let any_unavailable = positions
            .iter()
            .any(|p| p.current_value_usd.is_none());
        let total_value_usd = if any_unavailable {
            None
        } else {
            Some(positions.iter().filter_map(|p| p.current_value_usd).sum())
        };
        let total_unrealized_pnl_usd = if any_unavailable {
            None
        } else {
            Some(positions.iter().filter_map(|p| p.unrealized_pnl_usd).sum())
        };
        let total_unrealized_pnl_pct = match (total_unrealized_pnl_usd, total_cost_basis_usd) {
            (Some(pnl), cost) if !cost.is_zero() => Some(pnl / cost),
            _ => None,
        };
        let stale_price_count = positions
            .iter()
            .filter(|p| p.price_confidence == Confidence::Stale)
            .count() as u32;

        PortfolioSummary {
            total_value_usd,
            total_cost_basis_usd,
            total_unrealized_pnl_usd,
            total_unrealized_pnl_pct,
            stale_price_count,
            position_count: positions.len() as u32,
        }
    }
}

/// Builds the `price_sources` hint map for `PortfolioSnapshot` (§3, §6.2):
/// one entry per distinct price source observed, pointing at the refresh
/// endpoint a client should hit for a tighter-confidence read.
pub fn price_source_hints(positions: &[PositionPnL]) -> HashMap<String, String> {
    let mut hints = HashMap::new();
    for position in positions {
        if let Some(source) = &position.price_source {
            hints
                .entry(source.clone())
                .or_insert_with(|| "GET /v4/trades/export-gpt/{wallet}?refresh=true".to_string());
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CostBasisConfidence;
    use crate::pricing::{PriceOracleConfig, SolSpotProvider};
    use std::time::Duration;

    fn position(mint: &str, balance: &str, cost_basis_usd: &str) -> Position {
        Position {
            position_id: "w::m::1".to_string(),
            wallet: "wallet1".to_string(),
            mint: mint.to_string(),
            balance: balance.parse().unwrap(),
            cost_basis_usd: cost_basis_usd.parse().unwrap(),
            cost_basis_confidence: CostBasisConfidence::Known,
            opened_at: 1000,
            last_trade_at: 1000,
            has_uncovered_sells: false,
        }
    }

    fn oracle_with_sol_spot_mode() -> Arc<PriceOracle> {
        let config = PriceOracleConfig {
            helius_only: false,
            sol_spot_only: true,
            external_provider_enabled: false,
            stale_ttl_seconds: 21600,
            sol_spot_ttl_seconds: 30,
        };
        let sol_spot = SolSpotProvider::new(reqwest::Client::new(), Duration::from_secs(30));
        Arc::new(PriceOracle::new(config, sol_spot))
    }

    #[tokio::test]
    async fn unavailable_price_yields_null_pnl_fields() {
        let oracle = oracle_with_sol_spot_mode();
        let calc = UnrealizedCalculator::new(oracle);
        let positions = vec![position("MintX", "100", "50")];
        let priced = calc.price_positions(positions).await;

        assert_eq!(priced.len(), 1);
        assert!(priced[0].current_value_usd.is_none());
        assert_eq!(priced[0].price_confidence, Confidence::Unavailable);
    }

    #[test]
    fn summarize_is_null_when_any_position_unpriced() {
        let priced = vec![PositionPnL {
            position: position("MintX", "100", "50"),
            current_price_usd: None,
            current_value_usd: None,
            unrealized_pnl_usd: None,
            unrealized_pnl_pct: None,
            price_confidence: Confidence::Unavailable,
            price_age_seconds: None,
            price_source: None,
        }];
        let summary = UnrealizedCalculator::summarize(&priced);
        assert!(summary.total_value_usd.is_none());
        assert_eq!(summary.total_cost_basis_usd, Decimal::new(50, 0));
    }

    #[test]
    fn summarize_zero_cost_basis_has_null_pct() {
        let priced = vec![PositionPnL {
            position: position("MintX", "100", "0"),
            current_price_usd: Some(Decimal::new(1, 0)),
            current_value_usd: Some(Decimal::new(100, 0)),
            unrealized_pnl_usd: Some(Decimal::new(100, 0)),
            unrealized_pnl_pct: None,
            price_confidence: Confidence::High,
            price_age_seconds: Some(0),
            price_source: Some("swap-implied".to_string()),
        }];
        let summary = UnrealizedCalculator::summarize(&priced);
        assert!(summary.total_unrealized_pnl_pct.is_none());
        assert_eq!(summary.total_value_usd, Some(Decimal::new(100, 0)));
    }
}
