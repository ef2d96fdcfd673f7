//! Layered price resolution (§4.5): swap-implied -> SOL-spot -> external ->
//! stale-cache -> unavailable. The oracle owns two caches that live for the
//! lifetime of the service (not per-run): the swap-implied slot-bucket map
//! and the "last known good" stale-fallback map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::domain::{is_sol_mint, Confidence, Trade, TradeAction};
use crate::error::WalletDocResult;

use super::external::{DisabledExternalPriceProvider, ExternalPriceProvider};
use super::sol_spot::SolSpotProvider;
use super::PriceOracleConfig;

/// One resolved price, independent of which tier produced it.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub price_usd: Decimal,
    pub confidence: Confidence,
    pub source: String,
    /// Age of the underlying observation. `0` for tiers computed fresh on
    /// this call (swap-implied, SOL-spot, external); the actual time since
    /// `remember_stale` for the stale tier (§4.5 item 4, §4.7 price-age
    /// budget).
    pub age_seconds: i64,
}

/// Buckets slots into ~1-minute windows (Solana's ~400ms slot time ~= 150
/// slots/min); the exact width only affects swap-implied cache hit rate,
/// never correctness.
const SLOT_BUCKET_WIDTH: u64 = 150;

struct StaleEntry {
    price: Decimal,
    source: String,
    cached_at: Instant,
}

pub struct PriceOracle {
    config: PriceOracleConfig,
    sol_spot: Arc<SolSpotProvider>,
    external: Arc<dyn ExternalPriceProvider>,
    swap_implied: DashMap<(String, u64), Decimal>,
    stale: DashMap<String, StaleEntry>,
}

impl PriceOracle {
    pub fn new(config: PriceOracleConfig, sol_spot: Arc<SolSpotProvider>) -> Self {
        Self {
            config,
            sol_spot,
            external: Arc::new(DisabledExternalPriceProvider),
            swap_implied: DashMap::new(),
            stale: DashMap::new(),
        }
    }

    pub fn with_external(mut self, provider: Arc<dyn ExternalPriceProvider>) -> Self {
        self.external = provider;
        self
    }

    /// Prices an entire extracted batch in place (§4.5), deriving the
    /// swap-implied cache from same-batch SOL/stable swaps first so later
    /// trades in the same slot range benefit from it.
    pub async fn price_trades(&self, trades: &mut [Trade]) -> WalletDocResult<()> {
        let sol_spot_price = self.sol_spot.current_price().await.ok();
        self.seed_swap_implied(trades, sol_spot_price);

        for trade in trades.iter_mut() {
            let quote = self
                .resolve(&trade.primary_token_mint, trade.slot, sol_spot_price)
                .await;
            let sol_quote = self.resolve(crate::domain::SOL_MINT, trade.slot, sol_spot_price).await;
            apply_quote(trade, quote, sol_quote);
        }
        Ok(())
    }

    /// Resolves a single mint's current price for the Unrealized P&L
    /// calculator (C7); "current" collapses the slot dimension to "now".
    pub async fn current_price(&self, mint: &str) -> Option<PriceQuote> {
        let sol_spot_price = self.sol_spot.current_price().await.ok();
        self.resolve(mint, u64::MAX, sol_spot_price).await
    }

    async fn resolve(
        &self,
        mint: &str,
        slot: u64,
        sol_spot_price: Option<Decimal>,
    ) -> Option<PriceQuote> {
        if is_sol_mint(mint) {
            return sol_spot_price.map(|p| PriceQuote {
                price_usd: p,
                confidence: Confidence::High,
                source: "sol-spot".to_string(),
                age_seconds: 0,
            });
        }

        if !self.config.sol_spot_only {
            if let Some(price) = self.swap_implied.get(&(mint.to_string(), bucket(slot))) {
                let quote = PriceQuote {
                    price_usd: *price,
                    confidence: Confidence::High,
                    source: "swap-implied".to_string(),
                    age_seconds: 0,
                };
                self.remember_stale(mint, &quote);
                return Some(quote);
            }
        }

        if self.config.sol_spot_only {
            if let Some(sol_price) = sol_spot_price {
                let quote = PriceQuote {
                    price_usd: sol_price,
                    confidence: Confidence::Est,
                    source: "sol-spot-mode".to_string(),
                    age_seconds: 0,
                };
                self.remember_stale(mint, &quote);
                return Some(quote);
            }
        }

        if self.config.external_provider_enabled && !self.config.helius_only {
            if let Some(price) = self.external_lookup(mint).await {
                let quote = PriceQuote {
                    price_usd: price,
                    confidence: Confidence::Est,
                    source: "external".to_string(),
                    age_seconds: 0,
                };
                self.remember_stale(mint, &quote);
                return Some(quote);
            }
        }

        if let Some(entry) = self.stale.get(mint) {
            if entry.cached_at.elapsed() < Duration::from_secs(self.config.stale_ttl_seconds) {
                return Some(PriceQuote {
                    price_usd: entry.price,
                    confidence: Confidence::Stale,
                    source: entry.source.clone(),
                    age_seconds: entry.cached_at.elapsed().as_secs() as i64,
                });
            }
        }

        None
    }

    async fn external_lookup(&self, mint: &str) -> Option<Decimal> {
        let now_minute = crate::time::unix_minute_now();
        let mints = vec![mint.to_string()];
        let mut prices = self
            .external
            .prices_at_minute(&mints, now_minute)
            .await
            .ok()?;
        prices.remove(mint)
    }

    fn remember_stale(&self, mint: &str, quote: &PriceQuote) {
        self.stale.insert(
            mint.to_string(),
            StaleEntry {
                price: quote.price_usd,
                source: quote.source.clone(),
                cached_at: Instant::now(),
            },
        );
    }

    /// Populates the swap-implied cache from SOL/stable and SOL/token
    /// swaps observed in the batch (§4.5: "maintained by a small table
    /// mapping slot -> SOL/USD, populated from the same swap-implied map;
    /// otherwise falls back to the current SOL/USD rate"). `sol_spot_price`
    /// is that fallback for slot buckets with no SOL/stable swap to anchor
    /// on — without it a lone-BUY batch (no SOL/stable leg anywhere) would
    /// never seed a slot price and the swap-implied tier would stay empty.
    fn seed_swap_implied(&self, trades: &[Trade], sol_spot_price: Option<Decimal>) {
        let mut sol_price_by_slot_bucket: HashMap<u64, Decimal> = HashMap::new();

        for trade in trades {
            let (sol_leg, token_leg) = if is_sol_mint(&trade.token_in.mint) {
                (&trade.token_in, Some(&trade.token_out))
            } else if is_sol_mint(&trade.token_out.mint) {
                (&trade.token_out, Some(&trade.token_in))
            } else {
                continue;
            };
            if sol_leg.amount.is_zero() {
                continue;
            }
            if let Some(token_leg) = token_leg {
                if crate::domain::is_stable_mint(&token_leg.mint) && !token_leg.amount.is_zero() {
                    let implied_sol_usd = token_leg.amount / sol_leg.amount;
                    sol_price_by_slot_bucket.insert(bucket(trade.slot), implied_sol_usd);
                }
            }
        }

        for trade in trades {
            let (sol_leg, token_leg) = match trade.action {
                TradeAction::Buy if is_sol_mint(&trade.token_in.mint) => {
                    (&trade.token_in, &trade.token_out)
                }
                TradeAction::Sell if is_sol_mint(&trade.token_out.mint) => {
                    (&trade.token_out, &trade.token_in)
                }
                _ => continue,
            };
            if token_leg.amount.is_zero() || is_sol_mint(&token_leg.mint) {
                continue;
            }
            let sol_price_usd = sol_price_by_slot_bucket
                .get(&bucket(trade.slot))
                .copied()
                .or(sol_spot_price)
                .unwrap_or(Decimal::ZERO);
            if sol_price_usd.is_zero() {
                continue;
            }
            let price_usd = (sol_leg.amount / token_leg.amount) * sol_price_usd;
            self.swap_implied
                .insert((token_leg.mint.clone(), bucket(trade.slot)), price_usd);
        }
    }
}

fn bucket(slot: u64) -> u64 {
    if slot == u64::MAX {
        return u64::MAX;
    }
    slot / SLOT_BUCKET_WIDTH
}

fn apply_quote(trade: &mut Trade, quote: Option<PriceQuote>, sol_quote: Option<PriceQuote>) {
    match quote {
        Some(q) => {
            trade.price_usd = Some(q.price_usd);
            trade.value_usd = Some(q.price_usd * trade.amount);
            trade.confidence = q.confidence;
            trade.priced = true;
            if is_sol_mint(&trade.token_in.mint) || is_sol_mint(&trade.token_out.mint) {
                let sol_amount = if is_sol_mint(&trade.token_in.mint) {
                    trade.token_in.amount
                } else {
                    trade.token_out.amount
                };
                if !trade.amount.is_zero() {
                    trade.price_sol = Some(sol_amount / trade.amount);
                }
            }
        }
        None => {
            trade.price_usd = None;
            trade.value_usd = None;
            trade.priced = false;
            trade.confidence = Confidence::Unavailable;
        }
    }

    trade.fees_usd = sol_quote.map(|q| {
        let fee_sol = Decimal::from(trade.fee_lamports) / Decimal::from(1_000_000_000u64);
        fee_sol * q.price_usd
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TokenAmount, TxType, SOL_MINT};

    fn trade(action: TradeAction, in_mint: &str, in_amt: &str, out_mint: &str, out_amt: &str, primary: &str, slot: u64) -> Trade {
        Trade {
            wallet: "w".to_string(),
            signature: "s".to_string(),
            slot,
            block_time: 1,
            intra_tx_index: 0,
            action,
            token_in: TokenAmount { mint: in_mint.to_string(), symbol: None, amount: in_amt.parse().unwrap() },
            token_out: TokenAmount { mint: out_mint.to_string(), symbol: None, amount: out_amt.parse().unwrap() },
            primary_token_mint: primary.to_string(),
            amount: if primary == out_mint { out_amt.parse().unwrap() } else { in_amt.parse().unwrap() },
            dex: None,
            tx_type: TxType::Swap,
            fee_lamports: 5000,
            price_sol: None,
            price_usd: None,
            value_usd: None,
            priced: false,
            confidence: Confidence::Unavailable,
            fees_usd: None,
            realized_pnl_usd: None,
        }
    }

    #[test]
    fn bucket_groups_nearby_slots() {
        assert_eq!(bucket(100), bucket(101));
        assert_ne!(bucket(100), bucket(100 + SLOT_BUCKET_WIDTH));
    }

    #[tokio::test]
    async fn swap_implied_seeds_from_sol_stable_then_prices_sol_token_pair() {
        let config = PriceOracleConfig {
            helius_only: false,
            sol_spot_only: false,
            external_provider_enabled: false,
            stale_ttl_seconds: 21600,
            sol_spot_ttl_seconds: 30,
        };
        let sol_spot = SolSpotProvider::new(reqwest::Client::new(), std::time::Duration::from_secs(30));
        let oracle = PriceOracle::new(config, sol_spot);

        let usdc = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        let mint_x = "MintXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX";

        let mut trades = vec![
            trade(TradeAction::Sell, SOL_MINT, "1", usdc, "150", usdc, 1000),
            trade(TradeAction::Buy, SOL_MINT, "1", mint_x, "1000000", mint_x, 1000),
        ];

        oracle.seed_swap_implied(&trades, None);
        let quote = oracle.resolve(mint_x, 1000, None).await;
        assert!(quote.is_some());
        let quote = quote.unwrap();
        assert_eq!(quote.confidence, Confidence::High);
        let _ = &mut trades;
    }

    #[tokio::test]
    async fn seed_falls_back_to_sol_spot_when_no_sol_stable_swap_in_batch() {
        let config = PriceOracleConfig {
            helius_only: false,
            sol_spot_only: false,
            external_provider_enabled: false,
            stale_ttl_seconds: 21600,
            sol_spot_ttl_seconds: 30,
        };
        let sol_spot = SolSpotProvider::new(reqwest::Client::new(), std::time::Duration::from_secs(30));
        let oracle = PriceOracle::new(config, sol_spot);

        let mint_x = "MintXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX";
        // S1: a lone BUY of 1,000,000 X for 1 SOL, no SOL/stable swap in the
        // batch to anchor a slot price from, so the only fallback is the
        // current SOL/USD spot rate passed in directly.
        let trades = vec![trade(TradeAction::Buy, SOL_MINT, "1", mint_x, "1000000", mint_x, 1000)];

        oracle.seed_swap_implied(&trades, Some(Decimal::new(150, 0)));
        let quote = oracle.resolve(mint_x, 1000, None).await.unwrap();
        assert_eq!(quote.confidence, Confidence::High);
        assert_eq!(quote.price_usd, Decimal::new(15, 5));
    }
}
