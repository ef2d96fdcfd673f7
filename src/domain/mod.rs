//! Domain model (§3): fixed structs and tagged enums replacing the dynamic
//! dictionaries the source data model uses. All monetary fields are
//! `rust_decimal::Decimal` internally and become decimal strings only at
//! serialization time (§9 "Decimal arithmetic" note).

mod lot;
mod position;
mod raw_transaction;
mod snapshot;
mod trade;

pub use lot::Lot;
pub use position::{CostBasisConfidence, Position, PositionPnL};
pub use raw_transaction::{NativeTransfer, RawTransaction, SwapEvent, TokenTransfer};
pub use snapshot::{CachedSnapshot, PortfolioSnapshot, PortfolioSummary, POSITIONS_SCHEMA_VERSION};
pub use trade::{Confidence, Trade, TradeAction, TokenAmount, TxType};

/// Opaque transaction signature. Ordering for trades never relies on this
/// alone — see `TradeOrderKey` in `trade.rs`.
pub type Signature = String;

/// SOL's well-known mint address, used throughout the extractor and oracle
/// to recognize the "native" leg of a swap pair.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Mint addresses treated as stablecoins for primary-token classification
/// (§4.4). USDC and USDT mainnet mints.
pub const STABLE_MINTS: &[&str] = &[
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
];

pub fn is_sol_mint(mint: &str) -> bool {
    mint == SOL_MINT
}

pub fn is_stable_mint(mint: &str) -> bool {
    STABLE_MINTS.contains(&mint)
}

pub fn is_sol_or_stable(mint: &str) -> bool {
    is_sol_mint(mint) || is_stable_mint(mint)
}
