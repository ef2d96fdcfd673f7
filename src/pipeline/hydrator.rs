//! Transaction Hydrator (C3, §4.3). Consumes signatures in fixed-size
//! windows and dispatches each window as one concurrent batch request,
//! retrying the whole window (not individual requests) on 429.

use std::sync::Arc;

use tracing::warn;

use crate::domain::RawTransaction;
use crate::error::{WalletDocError, WalletDocResult};
use crate::rpc::{UpstreamRpcClient, BATCH_BACKOFF};

pub const WINDOW_SIZE: usize = 100;
const MAX_WINDOW_RETRIES: usize = 3;

/// A window's hydration result. `rate_limited` is set when all retries were
/// exhausted against 429s; the orchestrator decides whether to fail the run
/// or accept a partial result (§4.3, §7 `UpstreamRateLimited`).
pub struct WindowResult {
    pub index: usize,
    pub transactions: Vec<RawTransaction>,
    pub rate_limited: bool,
}

pub struct TransactionHydrator {
    client: Arc<UpstreamRpcClient>,
}

impl TransactionHydrator {
    pub fn new(client: Arc<UpstreamRpcClient>) -> Self {
        Self { client }
    }

    /// Hydrates every window concurrently (bounded by the client's shared
    /// semaphore) and returns results ordered by window index, not
    /// completion time (§4.3).
    pub async fn hydrate_all(
        &self,
        signatures: &[String],
    ) -> WalletDocResult<Vec<WindowResult>> {
        let windows: Vec<(usize, &[String])> = signatures
            .chunks(WINDOW_SIZE)
            .enumerate()
            .collect();

        let futures = windows
            .into_iter()
            .map(|(index, sigs)| self.hydrate_window(index, sigs.to_vec()));

        let mut results = Vec::with_capacity(futures.len());
        for result in futures::future::join_all(futures).await {
            results.push(result?);
        }
        results.sort_by_key(|r| r.index);
        Ok(results)
    }

    /// Retries the whole window, at the batch level, on both 429 and 5xx/
    /// timeout per §4.1's `[5s, 10s, 20s]` schedule. A 429 that survives all
    /// retries degrades to a partial result with `rate_limited` set, per
    /// §4.3; a 5xx/timeout that survives all retries is unrecoverable and
    /// propagates so the orchestrator fails the whole run rather than
    /// silently caching a truncated window (§7 `UpstreamFailure`).
    async fn hydrate_window(&self, index: usize, signatures: Vec<String>) -> WalletDocResult<WindowResult> {
        let mut attempt = 0;
        loop {
            match self.client.get_transactions(&signatures).await {
                Ok(txs) => {
                    return Ok(WindowResult {
                        index,
                        transactions: txs,
                        rate_limited: false,
                    });
                }
                Err(WalletDocError::UpstreamRateLimited { .. }) if attempt < MAX_WINDOW_RETRIES => {
                    let backoff = BATCH_BACKOFF[attempt.min(BATCH_BACKOFF.len() - 1)];
                    warn!(window = index, attempt, ?backoff, "upstream 429, retrying window");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(WalletDocError::UpstreamRateLimited { .. }) => {
                    return Ok(WindowResult {
                        index,
                        transactions: Vec::new(),
                        rate_limited: true,
                    });
                }
                Err(e @ (WalletDocError::UpstreamFailure(_) | WalletDocError::UpstreamTimeout(_)))
                    if attempt < MAX_WINDOW_RETRIES =>
                {
                    let backoff = BATCH_BACKOFF[attempt.min(BATCH_BACKOFF.len() - 1)];
                    warn!(window = index, attempt, ?backoff, error = %e, "upstream 5xx/timeout, retrying window");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(window = index, error = %e, "window hydration failed, failing run");
                    return Err(e);
                }
            }
        }
    }
}
