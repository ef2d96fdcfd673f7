//! FIFO Cost-Basis Engine (C6, §4.6). Maintains per-(wallet, mint) lot
//! queues and replays trades in `(block_time, slot, intra_tx_index)` order,
//! producing realized P&L per SELL and a materialized `Position` per mint
//! with an open balance at the end of the run.

mod unrealized;

pub use unrealized::{price_source_hints, UnrealizedCalculator};

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;

use crate::domain::{CostBasisConfidence, Lot, Position, Trade, TradeAction};

/// Lots below this remaining amount are closed and discarded (§4.6
/// "dust"). The domain model normalizes token amounts to their mint's own
/// decimal scale but does not carry `decimals` downstream of extraction, so
/// a single small epsilon stands in for the mint-specific `10^-decimals`
/// threshold the spec describes.
const DUST_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

struct MintState {
    queue: VecDeque<Lot>,
    opened_at: Option<i64>,
    last_trade_at: i64,
    has_uncovered_sells: bool,
}

impl MintState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            opened_at: None,
            last_trade_at: 0,
            has_uncovered_sells: false,
        }
    }
}

pub struct CostBasisEngine {
    wallet: String,
    mints: HashMap<String, MintState>,
}

impl CostBasisEngine {
    pub fn new(wallet: String) -> Self {
        Self {
            wallet,
            mints: HashMap::new(),
        }
    }

    /// Replays `trades` (expected pre-sorted by `order_key`), filling in
    /// `realized_pnl_usd` on SELLs in place, and returns the materialized
    /// open Positions at end-of-stream.
    pub fn process(&mut self, trades: &mut [Trade]) -> Vec<Position> {
        for trade in trades.iter_mut() {
            let state = self
                .mints
                .entry(trade.primary_token_mint.clone())
                .or_insert_with(MintState::new);

            match trade.action {
                TradeAction::Buy => Self::apply_buy(state, trade),
                TradeAction::Sell => Self::apply_sell(state, trade),
            }
        }

        self.materialize_positions()
    }

    fn apply_buy(state: &mut MintState, trade: &Trade) {
        if state.queue.is_empty() {
            state.opened_at = Some(trade.block_time);
            state.has_uncovered_sells = false;
        }

        let cost_per_unit = if trade.amount.is_zero() {
            None
        } else {
            trade.value_usd.map(|v| v / trade.amount)
        };

        state.queue.push_back(Lot::new(
            trade.primary_token_mint.clone(),
            trade.amount,
            cost_per_unit,
            trade.block_time,
            trade.signature.clone(),
        ));
        state.last_trade_at = trade.block_time;
    }

    fn apply_sell(state: &mut MintState, trade: &mut Trade) {
        let mut remaining_to_sell = trade.amount;
        let mut covered_amount = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;
        let mut any_unknown_cost = false;

        while remaining_to_sell > Decimal::ZERO {
            let Some(front) = state.queue.front_mut() else {
                break;
            };
            let consumed = front.remaining_amount.min(remaining_to_sell);
            match front.cost_per_unit_usd {
                Some(cpu) => total_cost += cpu * consumed,
                None => any_unknown_cost = true,
            }
            front.remaining_amount -= consumed;
            remaining_to_sell -= consumed;
            covered_amount += consumed;

            if front.remaining_amount <= DUST_EPSILON {
                state.queue.pop_front();
            }
        }

        if remaining_to_sell > Decimal::ZERO {
            state.has_uncovered_sells = true;
        }

        trade.realized_pnl_usd = if any_unknown_cost {
            None
        } else {
            trade.value_usd.map(|value_usd| {
                let covered_value = if trade.amount.is_zero() {
                    Decimal::ZERO
                } else {
                    value_usd * (covered_amount / trade.amount)
                };
                covered_value - total_cost
            })
        };

        state.last_trade_at = trade.block_time;
    }

    fn materialize_positions(&self) -> Vec<Position> {
        let mut positions = Vec::new();
        for (mint, state) in &self.mints {
            if state.queue.is_empty() {
                continue;
            }
            let opened_at = state
                .opened_at
                .unwrap_or_else(|| state.queue.front().map(|l| l.acquired_at).unwrap_or(0));

            let balance: Decimal = state.queue.iter().map(|l| l.remaining_amount).sum();
            let all_known = state.queue.iter().all(|l| l.cost_per_unit_usd.is_some());
            let cost_basis_usd: Decimal = state
                .queue
                .iter()
                .filter_map(|l| l.cost_of(l.remaining_amount))
                .sum();

            positions.push(Position {
                position_id: Position::make_id(&self.wallet, mint, opened_at),
                wallet: self.wallet.clone(),
                mint: mint.clone(),
                balance,
                cost_basis_usd,
                cost_basis_confidence: if all_known {
                    CostBasisConfidence::Known
                } else {
                    CostBasisConfidence::Unknown
                },
                opened_at,
                last_trade_at: state.last_trade_at,
                has_uncovered_sells: state.has_uncovered_sells,
            });
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Confidence, TokenAmount, TxType};

    fn buy(mint: &str, amount: &str, value_usd: &str, block_time: i64, sig: &str) -> Trade {
        Trade {
            wallet: "w".to_string(),
            signature: sig.to_string(),
            slot: block_time as u64,
            block_time,
            intra_tx_index: 0,
            action: TradeAction::Buy,
            token_in: TokenAmount {
                mint: crate::domain::SOL_MINT.to_string(),
                symbol: None,
                amount: Decimal::ONE,
            },
            token_out: TokenAmount {
                mint: mint.to_string(),
                symbol: None,
                amount: amount.parse().unwrap(),
            },
            primary_token_mint: mint.to_string(),
            amount: amount.parse().unwrap(),
            dex: None,
            tx_type: TxType::Swap,
            fee_lamports: 5000,
            price_sol: None,
            price_usd: None,
            value_usd: Some(value_usd.parse().unwrap()),
            priced: true,
            confidence: Confidence::High,
            fees_usd: None,
            realized_pnl_usd: None,
        }
    }

    fn sell(mint: &str, amount: &str, value_usd: &str, block_time: i64, sig: &str) -> Trade {
        let mut t = buy(mint, amount, value_usd, block_time, sig);
        t.action = TradeAction::Sell;
        t
    }

    #[test]
    fn s1_single_buy_fresh_wallet() {
        let mut trades = vec![buy("MintX", "1000000", "150.00", 1000, "sig1")];
        let mut engine = CostBasisEngine::new("wallet1".to_string());
        let positions = engine.process(&mut trades);

        assert_eq!(positions.len(), 1);
        let pos = &positions[0];
        assert_eq!(pos.balance, Decimal::new(1_000_000, 0));
        assert_eq!(pos.cost_basis_usd, Decimal::new(15000, 2));
        assert!(trades[0].realized_pnl_usd.is_none());
    }

    #[test]
    fn s2_buy_then_full_sell_at_2x() {
        let mut trades = vec![
            buy("MintX", "1000000", "150", 1000, "sig1"),
            sell("MintX", "1000000", "300", 2000, "sig2"),
        ];
        let mut engine = CostBasisEngine::new("wallet1".to_string());
        let positions = engine.process(&mut trades);

        assert!(positions.is_empty());
        assert_eq!(trades[1].realized_pnl_usd, Some(Decimal::new(150, 0)));
    }

    #[test]
    fn s3_partial_sell_after_two_buys_fifo() {
        let mut trades = vec![
            buy("MintX", "500", "500", 1000, "sig1"),   // $1/unit
            buy("MintX", "500", "1000", 2000, "sig2"),  // $2/unit
            sell("MintX", "600", "1800", 3000, "sig3"), // $3/unit
        ];
        let mut engine = CostBasisEngine::new("wallet1".to_string());
        let positions = engine.process(&mut trades);

        assert_eq!(trades[2].realized_pnl_usd, Some(Decimal::new(1100, 0)));
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].balance, Decimal::new(400, 0));
        assert_eq!(positions[0].cost_basis_usd, Decimal::new(800, 0));
    }

    #[test]
    fn over_sell_marks_uncovered_and_empties_queue() {
        let mut trades = vec![
            buy("MintX", "100", "100", 1000, "sig1"),
            sell("MintX", "150", "450", 2000, "sig2"),
        ];
        let mut engine = CostBasisEngine::new("wallet1".to_string());
        let positions = engine.process(&mut trades);

        assert!(positions.is_empty());
    }

    #[test]
    fn reopens_new_generation_after_full_close() {
        let mut trades = vec![
            buy("MintX", "100", "100", 1000, "sig1"),
            sell("MintX", "100", "200", 2000, "sig2"),
            buy("MintX", "50", "100", 3000, "sig3"),
        ];
        let mut engine = CostBasisEngine::new("wallet1".to_string());
        let positions = engine.process(&mut trades);

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].opened_at, 3000);
        assert!(positions[0]
            .position_id
            .ends_with("::3000"));
    }
}
