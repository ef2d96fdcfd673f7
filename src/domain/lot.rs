use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Signature;

/// A FIFO cost-basis unit (§3, §4.6). Opened by BUYs, consumed (possibly
/// partially) by SELLs, in queue order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub mint: String,
    pub remaining_amount: Decimal,
    /// `None` when the opening trade had no resolvable `value_usd`; the
    /// owning position stays `cost_basis_confidence = unknown` until every
    /// remaining lot in its queue has a known cost (§4.6).
    pub cost_per_unit_usd: Option<Decimal>,
    pub acquired_at: i64,
    pub source_signature: Signature,
}

impl Lot {
    pub fn new(
        mint: String,
        amount: Decimal,
        cost_per_unit_usd: Option<Decimal>,
        acquired_at: i64,
        source_signature: Signature,
    ) -> Self {
        Self {
            mint,
            remaining_amount: amount,
            cost_per_unit_usd,
            acquired_at,
            source_signature,
        }
    }

    pub fn cost_of(&self, amount: Decimal) -> Option<Decimal> {
        self.cost_per_unit_usd.map(|cpu| cpu * amount)
    }
}
