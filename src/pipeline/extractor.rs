//! Swap Extractor (C4, §4.4). Converts a hydrated transaction into zero or
//! more canonical trades: the structured swap-event path when present, a
//! token-transfer heuristic otherwise.

use rust_decimal::Decimal;

use crate::domain::{
    is_sol_mint, is_sol_or_stable, is_stable_mint, Confidence, RawTransaction, TokenAmount, Trade,
    TradeAction, TxType,
};

pub struct SwapExtractor;

impl SwapExtractor {
    /// Deterministic given the same `RawTransaction`: no randomness, no
    /// wall-clock reads. `intra_tx_index` reflects emission order within
    /// the transaction (§4.4).
    pub fn extract(wallet: &str, tx: &RawTransaction) -> Vec<Trade> {
        if let Some(event) = &tx.swap_event {
            return vec![Self::from_swap_event(wallet, tx, event, 0)];
        }
        Self::from_token_transfers(wallet, tx)
    }

    fn from_swap_event(
        wallet: &str,
        tx: &RawTransaction,
        event: &crate::domain::SwapEvent,
        intra_tx_index: u32,
    ) -> Trade {
        let token_in_amount = to_decimal(event.token_in_amount, event.token_in_decimals);
        let token_out_amount = to_decimal(event.token_out_amount, event.token_out_decimals);

        // Wallet received the non-SOL mint => BUY; otherwise SELL.
        let action = if !is_sol_mint(&event.token_out_mint) {
            TradeAction::Buy
        } else {
            TradeAction::Sell
        };

        let primary_token_mint = if !is_sol_or_stable(&event.token_out_mint) {
            event.token_out_mint.clone()
        } else {
            event.token_in_mint.clone()
        };

        let amount = if primary_token_mint == event.token_out_mint {
            token_out_amount
        } else {
            token_in_amount
        };

        Trade {
            wallet: wallet.to_string(),
            signature: tx.signature.clone(),
            slot: tx.slot,
            block_time: tx.block_time,
            intra_tx_index,
            action,
            token_in: TokenAmount {
                mint: event.token_in_mint.clone(),
                symbol: None,
                amount: token_in_amount,
            },
            token_out: TokenAmount {
                mint: event.token_out_mint.clone(),
                symbol: None,
                amount: token_out_amount,
            },
            primary_token_mint,
            amount,
            dex: event.dex.clone().or_else(|| tx.source.clone()),
            tx_type: TxType::Swap,
            fee_lamports: tx.fee_lamports,
            price_sol: None,
            price_usd: None,
            value_usd: None,
            priced: false,
            confidence: Confidence::Unavailable,
            fees_usd: None,
            realized_pnl_usd: None,
        }
    }

    /// Fallback path (§4.4): reconstruct from `token_transfers[]`.
    fn from_token_transfers(wallet: &str, tx: &RawTransaction) -> Vec<Trade> {
        let outs: Vec<_> = tx
            .token_transfers
            .iter()
            .filter(|t| t.from == wallet)
            .collect();
        let ins: Vec<_> = tx
            .token_transfers
            .iter()
            .filter(|t| t.to == wallet)
            .collect();

        let valid = matches!((outs.len(), ins.len()), (1..=3, 1) | (1, 1..=3));
        if !valid {
            return Vec::new();
        }

        let out_mint_sum = sum_by_mint(&outs);
        let in_mint_sum = sum_by_mint(&ins);

        // Exactly one side's mint(s) collapse to a single distinct mint in
        // a valid pattern (n-to-1 or 1-to-n); find the primary non-SOL,
        // non-stable counterparty.
        let out_mint = single_mint(&out_mint_sum);
        let in_mint = single_mint(&in_mint_sum);

        let (out_mint, out_amount, out_decimals) = match out_mint {
            Some(m) => m,
            None => return Vec::new(),
        };
        let (in_mint, in_amount, in_decimals) = match in_mint {
            Some(m) => m,
            None => return Vec::new(),
        };

        let out_is_primary_candidate = !is_sol_or_stable(&out_mint);
        let in_is_primary_candidate = !is_sol_or_stable(&in_mint);

        // Both non-SOL: no canonical SOL reference price available (§4.4).
        if out_is_primary_candidate && in_is_primary_candidate {
            return Vec::new();
        }
        // Neither non-SOL (e.g. SOL<->stable): no primary token to track.
        if !out_is_primary_candidate && !in_is_primary_candidate {
            return Vec::new();
        }

        let (action, primary_mint, primary_amount, counter_mint, counter_amount, counter_decimals) =
            if out_is_primary_candidate {
                // Wallet sent the primary token => SELL.
                (
                    TradeAction::Sell,
                    out_mint.clone(),
                    to_decimal(out_amount, out_decimals),
                    in_mint.clone(),
                    in_amount,
                    in_decimals,
                )
            } else {
                // Wallet received the primary token => BUY.
                (
                    TradeAction::Buy,
                    in_mint.clone(),
                    to_decimal(in_amount, in_decimals),
                    out_mint.clone(),
                    out_amount,
                    out_decimals,
                )
            };

        let _ = is_stable_mint; // kept for readability of the branch above

        let trade = Trade {
            wallet: wallet.to_string(),
            signature: tx.signature.clone(),
            slot: tx.slot,
            block_time: tx.block_time,
            intra_tx_index: 0,
            action,
            token_in: TokenAmount {
                mint: out_mint,
                symbol: None,
                amount: to_decimal(out_amount, out_decimals),
            },
            token_out: TokenAmount {
                mint: in_mint,
                symbol: None,
                amount: to_decimal(in_amount, in_decimals),
            },
            primary_token_mint: primary_mint,
            amount: primary_amount,
            dex: tx.source.clone(),
            tx_type: TxType::TransferImplied,
            fee_lamports: tx.fee_lamports,
            price_sol: None,
            price_usd: None,
            value_usd: None,
            priced: false,
            confidence: Confidence::Unavailable,
            fees_usd: None,
            realized_pnl_usd: None,
        };

        let _ = (counter_mint, counter_amount, counter_decimals);
        vec![trade]
    }
}

fn to_decimal(raw: u64, decimals: u8) -> Decimal {
    Decimal::from(raw) / Decimal::from(10u64.pow(decimals as u32))
}

/// Sums amounts per mint on one side of a transfer set (§4.4: "when
/// multiple transfers exist on one side, sum amounts of matching mints").
fn sum_by_mint(transfers: &[&crate::domain::TokenTransfer]) -> Vec<(String, u64, u8)> {
    let mut sums: Vec<(String, u64, u8)> = Vec::new();
    for t in transfers {
        if let Some(entry) = sums.iter_mut().find(|(m, _, _)| *m == t.mint) {
            entry.1 += t.amount_raw;
        } else {
            sums.push((t.mint.clone(), t.amount_raw, t.decimals));
        }
    }
    sums
}

/// A valid pattern collapses one side to a single mint after summing; if
/// the side still spans multiple distinct mints the transaction does not
/// match the documented transfer-pattern table and is discarded.
fn single_mint(sums: &[(String, u64, u8)]) -> Option<(String, u64, u8)> {
    if sums.len() == 1 {
        Some(sums[0].clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenTransfer;

    fn base_tx(transfers: Vec<TokenTransfer>) -> RawTransaction {
        RawTransaction {
            signature: "sig1".to_string(),
            slot: 100,
            block_time: 1_700_000_000,
            swap_event: None,
            token_transfers: transfers,
            native_transfers: vec![],
            source: Some("raydium".to_string()),
            fee_lamports: 5000,
        }
    }

    #[test]
    fn fallback_buy_one_out_one_in() {
        let wallet = "WalletAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        let tx = base_tx(vec![
            TokenTransfer {
                mint: crate::domain::SOL_MINT.to_string(),
                from: wallet.to_string(),
                to: "pool".to_string(),
                amount_raw: 1_000_000_000,
                decimals: 9,
            },
            TokenTransfer {
                mint: "MintXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX".to_string(),
                from: "pool".to_string(),
                to: wallet.to_string(),
                amount_raw: 1_000_000,
                decimals: 6,
            },
        ]);

        let trades = SwapExtractor::extract(wallet, &tx);
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.action, TradeAction::Buy);
        assert_eq!(trade.primary_token_mint, "MintXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX");
        assert_eq!(trade.amount, Decimal::new(1, 0));
    }

    #[test]
    fn fallback_discards_liquidity_add_zero_in() {
        let wallet = "WalletAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        let tx = base_tx(vec![TokenTransfer {
            mint: crate::domain::SOL_MINT.to_string(),
            from: wallet.to_string(),
            to: "pool".to_string(),
            amount_raw: 1_000_000_000,
            decimals: 9,
        }]);
        assert!(SwapExtractor::extract(wallet, &tx).is_empty());
    }

    #[test]
    fn fallback_sums_multi_leg_outs() {
        let wallet = "WalletAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        let mint = "MintXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX";
        let tx = base_tx(vec![
            TokenTransfer {
                mint: mint.to_string(),
                from: wallet.to_string(),
                to: "pool_a".to_string(),
                amount_raw: 500_000,
                decimals: 6,
            },
            TokenTransfer {
                mint: mint.to_string(),
                from: wallet.to_string(),
                to: "pool_b".to_string(),
                amount_raw: 500_000,
                decimals: 6,
            },
            TokenTransfer {
                mint: crate::domain::SOL_MINT.to_string(),
                from: "pool_a".to_string(),
                to: wallet.to_string(),
                amount_raw: 2_000_000_000,
                decimals: 9,
            },
        ]);

        let trades = SwapExtractor::extract(wallet, &tx);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].action, TradeAction::Sell);
        assert_eq!(trades[0].amount, Decimal::new(1, 0));
    }

    #[test]
    fn fallback_discards_both_non_sol() {
        let wallet = "WalletAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        let tx = base_tx(vec![
            TokenTransfer {
                mint: "MintAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
                from: wallet.to_string(),
                to: "pool".to_string(),
                amount_raw: 1_000_000,
                decimals: 6,
            },
            TokenTransfer {
                mint: "MintBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB".to_string(),
                from: "pool".to_string(),
                to: wallet.to_string(),
                amount_raw: 1_000_000,
                decimals: 6,
            },
        ]);
        assert!(SwapExtractor::extract(wallet, &tx).is_empty());
    }
}
