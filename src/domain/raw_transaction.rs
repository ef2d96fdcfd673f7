use serde::{Deserialize, Serialize};

use super::Signature;

/// The hydrated provider payload (§3). Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: i64,
    pub swap_event: Option<SwapEvent>,
    pub token_transfers: Vec<TokenTransfer>,
    pub native_transfers: Vec<NativeTransfer>,
    pub source: Option<String>,
    pub fee_lamports: u64,
}

/// Structured representation of a DEX swap, when the provider's enrichment
/// layer was able to produce one (§4.4 primary path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapEvent {
    pub token_in_mint: String,
    pub token_in_amount: u64,
    pub token_in_decimals: u8,
    pub token_out_mint: String,
    pub token_out_amount: u64,
    pub token_out_decimals: u8,
    pub dex: Option<String>,
}

/// Raw SPL-token balance change attached to a transaction (§4.4 fallback
/// path reconstructs swaps from these).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub mint: String,
    pub from: String,
    pub to: String,
    pub amount_raw: u64,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeTransfer {
    pub from: String,
    pub to: String,
    pub lamports: u64,
}
