//! Versioned cache key builders (§4.8). Keeping the format in one place
//! means a schema bump only touches this file.

pub const SNAPSHOT_KEY_PREFIX: &str = "pos:v1:";

pub fn snapshot_key(wallet: &str) -> String {
    format!("pos:v1:snapshot:{wallet}")
}

pub fn position_key(wallet: &str, mint: &str) -> String {
    format!("pos:v1:position:{wallet}:{mint}")
}

pub fn trades_key(wallet: &str) -> String {
    format!("trades:v1:{wallet}")
}

/// Glob scoping every `pos:v1:*` key for one wallet (matches both the
/// snapshot key, where the wallet is a suffix, and per-position keys,
/// where it's a middle segment), used by the trade-observed invalidation
/// rule in §4.8.
pub fn wallet_positions_glob(wallet: &str) -> String {
    format!("pos:v1:*{wallet}*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_versioned_and_namespaced() {
        assert_eq!(snapshot_key("wallet1"), "pos:v1:snapshot:wallet1");
        assert_eq!(position_key("wallet1", "mintX"), "pos:v1:position:wallet1:mintX");
        assert_eq!(trades_key("wallet1"), "trades:v1:wallet1");
    }
}
