//! Trades-export wire formats (§6.2). Three schema versions share one
//! underlying `Trade` but diverge in shape: `v0.7.0` is the original
//! row-per-trade object, `v0.7.1-trades-value` adds realized/unrealized
//! value fields, and `v0.7.2-compact` re-encodes every row as a fixed
//! position array to stay under the ≤200 KB response target.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{Trade, TradeAction, TokenAmount, TxType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeExportSchema {
    V070,
    V071TradesValue,
    V072Compact,
}

impl TradeExportSchema {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "v0.7.0" => Some(Self::V070),
            "v0.7.1-trades-value" => Some(Self::V071TradesValue),
            "v0.7.2-compact" => Some(Self::V072Compact),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V070 => "v0.7.0",
            Self::V071TradesValue => "v0.7.1-trades-value",
            Self::V072Compact => "v0.7.2-compact",
        }
    }

    pub fn default_version() -> Self {
        Self::V071TradesValue
    }
}

/// Fields common to every row-per-trade schema. `token` is the trade's
/// `primary_token_mint` — the one non-SOL/non-stable leg of the pair,
/// which is what a GPT client actually wants to key on (the full
/// `token_in`/`token_out` pair is carried alongside for completeness).
#[derive(Debug, Clone, Serialize)]
pub struct TradeRowBase {
    pub timestamp: DateTime<Utc>,
    pub signature: String,
    pub action: &'static str,
    pub token: String,
    pub amount: Decimal,
    pub token_in: TokenAmount,
    pub token_out: TokenAmount,
    pub price_sol: Option<Decimal>,
    pub price_usd: Option<Decimal>,
    pub priced: bool,
    pub dex: Option<String>,
    pub tx_type: TxType,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeRowWithValue {
    #[serde(flatten)]
    pub base: TradeRowBase,
    pub value_usd: Option<Decimal>,
    pub pnl_usd: Option<Decimal>,
    pub fees_usd: Option<Decimal>,
}

fn action_str(action: TradeAction) -> &'static str {
    match action {
        TradeAction::Buy => "buy",
        TradeAction::Sell => "sell",
    }
}

impl TradeRowBase {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            timestamp: DateTime::from_timestamp(trade.block_time, 0).unwrap_or_else(Utc::now),
            signature: trade.signature.clone(),
            action: action_str(trade.action),
            token: trade.primary_token_mint.clone(),
            amount: trade.amount,
            token_in: trade.token_in.clone(),
            token_out: trade.token_out.clone(),
            price_sol: trade.price_sol,
            price_usd: trade.price_usd,
            priced: trade.priced,
            dex: trade.dex.clone(),
            tx_type: trade.tx_type,
        }
    }
}

impl TradeRowWithValue {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            base: TradeRowBase::from_trade(trade),
            value_usd: trade.value_usd,
            pnl_usd: trade.realized_pnl_usd,
            fees_usd: trade.fees_usd,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TradesExportV070 {
    pub wallet: String,
    pub signatures: Vec<String>,
    pub trades: Vec<TradeRowBase>,
    pub schema_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradesExportV071 {
    pub wallet: String,
    pub signatures: Vec<String>,
    pub trades: Vec<TradeRowWithValue>,
    pub schema_version: String,
}

/// Ordered field names for the compact row arrays (§6.2). `token_in` /
/// `token_out` are dropped here (recoverable from `token` + `amount` for
/// a GPT client) — the whole point of this schema is hitting the size
/// target, and the structured pair objects are the biggest line item.
pub const COMPACT_FIELD_MAP: &[&str] = &[
    "timestamp",
    "signature",
    "action",
    "token",
    "amount",
    "price_sol",
    "price_usd",
    "value_usd",
    "pnl_usd",
    "fees_usd",
    "priced",
    "dex",
    "tx_type",
];

#[derive(Debug, Clone, Serialize)]
pub struct CompactConstants {
    pub actions: [&'static str; 2],
    pub sol_mint: &'static str,
}

impl Default for CompactConstants {
    fn default() -> Self {
        Self {
            actions: ["sell", "buy"],
            sol_mint: crate::domain::SOL_MINT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompactSummary {
    pub total: usize,
    pub included: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradesExportV072Compact {
    pub wallet: String,
    pub schema_version: String,
    pub field_map: Vec<&'static str>,
    pub trades: Vec<Vec<Value>>,
    pub constants: CompactConstants,
    pub summary: CompactSummary,
}

fn decimal_or_empty(value: Option<Decimal>) -> Value {
    match value {
        Some(d) => Value::String(d.to_string()),
        None => Value::String(String::new()),
    }
}

fn string_or_empty(value: Option<&String>) -> Value {
    match value {
        Some(s) => Value::String(s.clone()),
        None => Value::String(String::new()),
    }
}

fn action_index(action: &'static str) -> Value {
    Value::Number((if action == "sell" { 0 } else { 1 }).into())
}

/// Encodes one trade as a fixed-position array matching `COMPACT_FIELD_MAP`.
pub fn compact_row(trade: &Trade) -> Vec<Value> {
    let base = TradeRowBase::from_trade(trade);
    vec![
        Value::String(base.timestamp.to_rfc3339()),
        Value::String(base.signature),
        action_index(base.action),
        Value::String(base.token),
        Value::String(base.amount.to_string()),
        decimal_or_empty(base.price_sol),
        decimal_or_empty(base.price_usd),
        decimal_or_empty(trade.value_usd),
        decimal_or_empty(trade.realized_pnl_usd),
        decimal_or_empty(trade.fees_usd),
        Value::Bool(base.priced),
        string_or_empty(base.dex.as_ref()),
        Value::String(base.tx_type_str()),
    ]
}

impl TradeRowBase {
    fn tx_type_str(&self) -> String {
        match self.tx_type {
            TxType::Swap => "swap".to_string(),
            TxType::Liquidity => "liquidity".to_string(),
            TxType::TransferImplied => "transfer-implied".to_string(),
        }
    }
}

/// Inverse of [`compact_row`]: expands one compact row back into a
/// field-name-keyed map of the same common fields the row-per-trade
/// schemas expose, so `expand(compact(T))` can be compared against `T`
/// on those fields (property §8.7).
pub fn expand_compact_row(row: &[Value]) -> HashMap<String, Value> {
    COMPACT_FIELD_MAP
        .iter()
        .zip(row.iter())
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

pub fn build_compact(wallet: &str, trades: &[Trade]) -> TradesExportV072Compact {
    TradesExportV072Compact {
        wallet: wallet.to_string(),
        schema_version: TradeExportSchema::V072Compact.as_str().to_string(),
        field_map: COMPACT_FIELD_MAP.to_vec(),
        trades: trades.iter().map(compact_row).collect(),
        constants: CompactConstants::default(),
        summary: CompactSummary {
            total: trades.len(),
            included: trades.len(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Confidence, TokenAmount};

    fn sample_trade() -> Trade {
        Trade {
            wallet: "wallet1".to_string(),
            signature: "sig1".to_string(),
            slot: 123,
            block_time: 1_700_000_000,
            intra_tx_index: 0,
            action: TradeAction::Buy,
            token_in: TokenAmount { mint: crate::domain::SOL_MINT.to_string(), symbol: None, amount: Decimal::ONE },
            token_out: TokenAmount { mint: "MintX".to_string(), symbol: None, amount: Decimal::new(1_000_000, 0) },
            primary_token_mint: "MintX".to_string(),
            amount: Decimal::new(1_000_000, 0),
            dex: Some("jupiter".to_string()),
            tx_type: TxType::Swap,
            fee_lamports: 5000,
            price_sol: Some(Decimal::new(1, 4)),
            price_usd: Some(Decimal::new(150, 3)),
            value_usd: Some(Decimal::new(150_000, 3)),
            priced: true,
            confidence: Confidence::High,
            fees_usd: Some(Decimal::new(1, 2)),
            realized_pnl_usd: None,
        }
    }

    #[test]
    fn schema_parse_round_trips_known_strings() {
        for s in ["v0.7.0", "v0.7.1-trades-value", "v0.7.2-compact"] {
            let parsed = TradeExportSchema::parse(s).unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!(TradeExportSchema::parse("v9.9.9").is_none());
    }

    #[test]
    fn v070_omits_value_and_pnl_fields() {
        let row = TradeRowBase::from_trade(&sample_trade());
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("value_usd").is_none());
        assert!(json.get("pnl_usd").is_none());
        assert_eq!(json["token"], "MintX");
    }

    #[test]
    fn compact_expand_round_trips_common_fields() {
        let trade = sample_trade();
        let row = compact_row(&trade);
        let expanded = expand_compact_row(&row);

        assert_eq!(expanded["token"], Value::String("MintX".to_string()));
        assert_eq!(expanded["action"], Value::Number(1.into())); // buy
        assert_eq!(expanded["priced"], Value::Bool(true));
        assert_eq!(
            expanded["amount"],
            Value::String(trade.amount.to_string())
        );
    }

    #[test]
    fn build_compact_targets_small_size() {
        let trades: Vec<Trade> = (0..50).map(|_| sample_trade()).collect();
        let compact = build_compact("wallet1", &trades);
        let encoded = serde_json::to_vec(&compact).unwrap();
        assert!(encoded.len() < 200 * 1024);
        assert_eq!(compact.summary.total, 50);
    }
}
