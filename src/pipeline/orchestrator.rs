//! Pipeline Orchestrator (C9, §4.9). Wires Pager → Hydrator → Extractor →
//! Oracle → Cost-Basis → Unrealized into one run, emitting progress events
//! and honoring a cooperative cancellation token and a wall-clock budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::costbasis::{CostBasisEngine, UnrealizedCalculator};
use crate::domain::{PortfolioSummary, PositionPnL, Trade};
use crate::error::{WalletDocError, WalletDocResult};
use crate::pricing::PriceOracle;
use crate::rpc::UpstreamRpcClient;

use super::extractor::SwapExtractor;
use super::hydrator::TransactionHydrator;
use super::pager::SignaturePager;

/// §4.9 phase table, in execution order. The string form is what travels
/// over the wire in progress events and SSE frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    FetchSignatures,
    FetchTransactions,
    ExtractTrades,
    ComputePositions,
    ComputeUnrealized,
}

impl Phase {
    /// Progress weight from the §4.9 table; used to compute a cumulative
    /// percentage as phases complete.
    fn weight(self) -> u32 {
        match self {
            Phase::FetchSignatures => 15,
            Phase::FetchTransactions => 35,
            Phase::ExtractTrades => 35,
            Phase::ComputePositions => 10,
            Phase::ComputeUnrealized => 5,
        }
    }

    fn cumulative_before(self) -> u32 {
        match self {
            Phase::FetchSignatures => 0,
            Phase::FetchTransactions => 15,
            Phase::ExtractTrades => 50,
            Phase::ComputePositions => 85,
            Phase::ComputeUnrealized => 95,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub percentage: u32,
    pub items_done: u64,
    pub items_total: Option<u64>,
    pub message: String,
}

/// Cooperative cancellation, checked at phase and window boundaries only
/// (§5: "cancellation-to-abort interval <= one transaction-window worth of
/// work"). A plain flag is sufficient because nothing awaits on it between
/// checks; the run loop polls it after every window.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct PipelineOutput {
    pub trades: Vec<Trade>,
    pub signatures: Vec<String>,
    pub positions: Vec<PositionPnL>,
    pub summary: PortfolioSummary,
    pub price_sources: std::collections::HashMap<String, String>,
    /// Set when any hydration window exhausted its 429 retries (§4.3) —
    /// surfaced to the caller as `PartialData`, never a hard failure.
    pub rate_limited_partial: bool,
}

pub struct PipelineOrchestrator {
    rpc: Arc<UpstreamRpcClient>,
    oracle: Arc<PriceOracle>,
    unrealized: Arc<UnrealizedCalculator>,
    request_timeout: Duration,
    max_pages: Option<u32>,
}

impl PipelineOrchestrator {
    pub fn new(
        rpc: Arc<UpstreamRpcClient>,
        oracle: Arc<PriceOracle>,
        request_timeout: Duration,
        max_pages: Option<u32>,
    ) -> Self {
        Self {
            unrealized: Arc::new(UnrealizedCalculator::new(oracle.clone())),
            rpc,
            oracle,
            request_timeout,
            max_pages,
        }
    }

    /// Runs the full cold-request pipeline for `wallet` (§2 control flow),
    /// applying the request-wide wall-clock budget and surfacing progress
    /// through `progress` when given. Returns `Timeout` if the budget is
    /// exceeded; the caller (HTTP surface / cache layer) is responsible for
    /// not persisting a timed-out run's output.
    pub async fn run(
        &self,
        wallet: &str,
        progress: Option<mpsc::Sender<ProgressEvent>>,
        cancel: CancelToken,
    ) -> WalletDocResult<PipelineOutput> {
        let budget = self.request_timeout;
        match tokio::time::timeout(budget, self.run_inner(wallet, progress, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(WalletDocError::Timeout(budget.as_secs())),
        }
    }

    async fn run_inner(
        &self,
        wallet: &str,
        progress: Option<mpsc::Sender<ProgressEvent>>,
        cancel: CancelToken,
    ) -> WalletDocResult<PipelineOutput> {
        self.emit(&progress, Phase::FetchSignatures, 0, None, "paging signatures").await;
        let pager = SignaturePager::new(self.rpc.clone(), wallet.to_string(), self.max_pages);
        let signatures = pager.collect_all().await?;
        self.emit(
            &progress,
            Phase::FetchSignatures,
            signatures.len() as u64,
            Some(signatures.len() as u64),
            "signatures collected",
        )
        .await;

        if cancel.is_canceled() {
            return Err(WalletDocError::Canceled);
        }

        self.emit(&progress, Phase::FetchTransactions, 0, Some(signatures.len() as u64), "hydrating transactions").await;
        let hydrator = TransactionHydrator::new(self.rpc.clone());
        let windows = hydrator.hydrate_all(&signatures).await?;

        let mut rate_limited_partial = false;
        let mut raw_transactions = Vec::new();
        for (done, window) in windows.into_iter().enumerate() {
            if cancel.is_canceled() {
                return Err(WalletDocError::Canceled);
            }
            rate_limited_partial |= window.rate_limited;
            raw_transactions.extend(window.transactions);
            self.emit(
                &progress,
                Phase::FetchTransactions,
                (done + 1) as u64,
                None,
                "transaction window hydrated",
            )
            .await;
        }

        self.emit(&progress, Phase::ExtractTrades, 0, Some(raw_transactions.len() as u64), "extracting trades").await;
        const EXTRACT_YIELD_INTERVAL: usize = 50;
        let mut trades = Vec::new();
        for (done, tx) in raw_transactions.iter().enumerate() {
            if done % EXTRACT_YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
                if cancel.is_canceled() {
                    return Err(WalletDocError::Canceled);
                }
            }
            trades.extend(SwapExtractor::extract(wallet, tx));
        }
        trades.sort_by_key(|t| t.order_key());
        self.emit(
            &progress,
            Phase::ExtractTrades,
            trades.len() as u64,
            Some(trades.len() as u64),
            "trades extracted",
        )
        .await;

        self.oracle.price_trades(&mut trades).await?;

        self.emit(&progress, Phase::ComputePositions, 0, None, "computing FIFO positions").await;
        let mut engine = CostBasisEngine::new(wallet.to_string());
        let positions = engine.process(&mut trades);
        self.emit(
            &progress,
            Phase::ComputePositions,
            positions.len() as u64,
            Some(positions.len() as u64),
            "positions materialized",
        )
        .await;

        self.emit(&progress, Phase::ComputeUnrealized, 0, Some(positions.len() as u64), "pricing open positions").await;
        let priced_positions = self.unrealized.price_positions(positions).await;
        let summary = UnrealizedCalculator::summarize(&priced_positions);
        let price_sources = crate::costbasis::price_source_hints(&priced_positions);
        self.emit(
            &progress,
            Phase::ComputeUnrealized,
            priced_positions.len() as u64,
            Some(priced_positions.len() as u64),
            "unrealized P&L computed",
        )
        .await;

        Ok(PipelineOutput {
            trades,
            signatures,
            positions: priced_positions,
            summary,
            price_sources,
            rate_limited_partial,
        })
    }

    async fn emit(
        &self,
        progress: &Option<mpsc::Sender<ProgressEvent>>,
        phase: Phase,
        items_done: u64,
        items_total: Option<u64>,
        message: &str,
    ) {
        let Some(tx) = progress else { return };
        let percentage = (phase.cumulative_before()
            + match items_total {
                Some(total) if total > 0 => {
                    ((items_done as f64 / total as f64) * phase.weight() as f64) as u32
                }
                _ => 0,
            })
        .min(100);
        let _ = tx
            .send(ProgressEvent {
                phase,
                percentage,
                items_done,
                items_total,
                message: message.to_string(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_weights_sum_to_100() {
        let total: u32 = [
            Phase::FetchSignatures,
            Phase::FetchTransactions,
            Phase::ExtractTrades,
            Phase::ComputePositions,
            Phase::ComputeUnrealized,
        ]
        .iter()
        .map(|p| p.weight())
        .sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn cumulative_before_matches_prefix_sums() {
        assert_eq!(Phase::FetchTransactions.cumulative_before(), Phase::FetchSignatures.weight());
        assert_eq!(
            Phase::ComputeUnrealized.cumulative_before(),
            Phase::FetchSignatures.weight()
                + Phase::FetchTransactions.weight()
                + Phase::ExtractTrades.weight()
                + Phase::ComputePositions.weight()
        );
    }

    #[test]
    fn cancel_token_starts_open() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        token.cancel();
        assert!(token.is_canceled());
    }
}
