//! External batched price-history provider (§4.5 item 3), keyed by
//! `(mint, unix_minute)`. Kept behind a trait so the oracle never depends
//! on a concrete vendor; the concrete HTTP-backed implementation lives at
//! the binary's composition root.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::error::WalletDocResult;

#[async_trait]
pub trait ExternalPriceProvider: Send + Sync {
    /// Batched lookup; missing entries in the result map mean "no price at
    /// that minute", not an error.
    async fn prices_at_minute(
        &self,
        mints: &[String],
        unix_minute: i64,
    ) -> WalletDocResult<HashMap<String, Decimal>>;
}

/// No-op provider used when `EXTERNAL_PROVIDER_ENABLED=false` or no
/// external price key is configured; always reports no data so the oracle
/// falls through to the stale-cache or unavailable tiers.
pub struct DisabledExternalPriceProvider;

#[async_trait]
impl ExternalPriceProvider for DisabledExternalPriceProvider {
    async fn prices_at_minute(
        &self,
        _mints: &[String],
        _unix_minute: i64,
    ) -> WalletDocResult<HashMap<String, Decimal>> {
        Ok(HashMap::new())
    }
}
