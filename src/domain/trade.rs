use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxType {
    Swap,
    Liquidity,
    TransferImplied,
}

/// Confidence tier on a resolved price (§4.5, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Est,
    Stale,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAmount {
    pub mint: String,
    pub symbol: Option<String>,
    pub amount: Decimal,
}

/// Canonical result of extraction (§3), enriched in place by the Price
/// Oracle and Cost-Basis Engine as the pipeline progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub wallet: String,
    pub signature: Signature,
    pub slot: u64,
    pub block_time: i64,
    pub intra_tx_index: u32,

    pub action: TradeAction,
    pub token_in: TokenAmount,
    pub token_out: TokenAmount,
    pub primary_token_mint: String,
    pub amount: Decimal,
    pub dex: Option<String>,
    pub tx_type: TxType,
    /// Transaction fee, carried through from `RawTransaction::fee_lamports`
    /// (§3) so the trades-export wire format (§6.2) can report `fees_usd`.
    pub fee_lamports: u64,

    // Enrichment, filled by the Price Oracle (C5). `None` until priced.
    pub price_sol: Option<Decimal>,
    pub price_usd: Option<Decimal>,
    pub value_usd: Option<Decimal>,
    pub priced: bool,
    pub confidence: Confidence,
    /// `fee_lamports` converted to USD at the trade's slot-anchored SOL
    /// price, when one was resolvable (§6.2 `fees_usd`).
    pub fees_usd: Option<Decimal>,

    // Filled by the Cost-Basis Engine (C6), SELLs only.
    pub realized_pnl_usd: Option<Decimal>,
}

impl Trade {
    /// `(block_time, slot, intra_tx_index)` ordering key used throughout
    /// the pipeline (§4.4 determinism, §5 ordering guarantees).
    pub fn order_key(&self) -> (i64, u64, u32) {
        (self.block_time, self.slot, self.intra_tx_index)
    }
}
