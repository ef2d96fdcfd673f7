//! Price Oracle (C5, §4.5): layered USD price resolution for a (mint,
//! timestamp) pair — swap-implied, SOL-spot, external-provider, stale-cache,
//! unavailable, in that order, first success wins.

mod external;
mod oracle;
mod sol_spot;

pub use external::ExternalPriceProvider;
pub use oracle::{PriceOracle, PriceQuote};
pub use sol_spot::SolSpotProvider;

/// Subset of `Config` the oracle needs, kept separate so pricing tests don't
/// have to construct a full service `Config` (§10.3).
#[derive(Debug, Clone)]
pub struct PriceOracleConfig {
    pub helius_only: bool,
    pub sol_spot_only: bool,
    pub external_provider_enabled: bool,
    pub stale_ttl_seconds: u64,
    pub sol_spot_ttl_seconds: u64,
}

impl From<&crate::config::Config> for PriceOracleConfig {
    fn from(cfg: &crate::config::Config) -> Self {
        Self {
            helius_only: cfg.price_helius_only,
            sol_spot_only: cfg.price_sol_spot_only,
            external_provider_enabled: cfg.external_provider_enabled,
            stale_ttl_seconds: cfg.stale_ttl.as_secs(),
            sol_spot_ttl_seconds: cfg.sol_spot_ttl.as_secs(),
        }
    }
}
