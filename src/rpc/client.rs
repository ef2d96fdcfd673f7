//! Upstream RPC Client (C1, §4.1). Rate-limited, concurrency-capped,
//! circuit-broken HTTP access to the chain provider: `getSignaturesForAddress`
//! and batched `getTransaction`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient as SolanaRpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature as SolanaSignature;
use solana_transaction_status::UiTransactionEncoding;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::domain::RawTransaction;
use crate::error::{WalletDocError, WalletDocResult};

use super::circuit_breaker::CircuitBreaker;
use super::rate_limiter::TokenBucket;

/// One page of signature enumeration (§4.2).
#[derive(Debug, Clone)]
pub struct SignaturePage {
    pub signatures: Vec<String>,
    pub next_cursor: Option<String>,
}

/// Batch-level backoff schedule applied by the caller (hydrator) on 429s
/// (§4.1, §4.3).
pub const BATCH_BACKOFF: [Duration; 3] = [
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(20),
];

pub struct UpstreamRpcClient {
    inner: SolanaRpcClient,
    semaphore: Arc<Semaphore>,
    rate_limiter: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    upstream_429_count: AtomicU64,
}

impl UpstreamRpcClient {
    pub fn new(endpoint: String, config: &Config) -> Self {
        let inner = SolanaRpcClient::new_with_timeout_and_commitment(
            endpoint,
            config.upstream_timeout,
            CommitmentConfig::confirmed(),
        );

        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_upstream)),
            rate_limiter: Arc::new(TokenBucket::new(config.upstream_rps)),
            breaker: Arc::new(CircuitBreaker::new(10, Duration::from_secs(30))),
            timeout: config.upstream_timeout,
            upstream_429_count: AtomicU64::new(0),
        }
    }

    pub fn upstream_429_count(&self) -> u64 {
        self.upstream_429_count.load(Ordering::Relaxed)
    }

    /// `getSignaturesForAddress`, one page of at most 1,000 signatures,
    /// newest-first, with `max_supported_transaction_version = 0` (§4.1,
    /// §4.2).
    pub async fn get_signatures(
        &self,
        wallet: &str,
        before: Option<&str>,
    ) -> WalletDocResult<SignaturePage> {
        if !self.breaker.allow_request() {
            return Err(WalletDocError::UpstreamFailure(
                "circuit breaker open".to_string(),
            ));
        }

        let pubkey: Pubkey = wallet
            .parse()
            .map_err(|_| WalletDocError::Validation("invalid wallet address".to_string()))?;
        let before_sig: Option<SolanaSignature> = match before {
            Some(s) => Some(
                s.parse()
                    .map_err(|_| WalletDocError::Internal("invalid cursor signature".to_string()))?,
            ),
            None => None,
        };

        self.rate_limiter.acquire().await;
        let _permit = self.semaphore.acquire().await.map_err(|_| {
            WalletDocError::Internal("upstream semaphore closed".to_string())
        })?;

        let config = GetConfirmedSignaturesForAddress2Config {
            before: before_sig,
            until: None,
            limit: Some(1000),
            commitment: Some(CommitmentConfig::confirmed()),
        };

        let result = tokio::time::timeout(
            self.timeout,
            self.inner
                .get_signatures_for_address_with_config(&pubkey, config),
        )
        .await;

        match result {
            Err(_) => {
                self.breaker.record_failure();
                Err(WalletDocError::UpstreamTimeout(self.timeout.as_secs()))
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                Err(self.classify_client_error(&e))
            }
            Ok(Ok(statuses)) => {
                self.breaker.record_success();
                let next_cursor = statuses.last().map(|s| s.signature.clone());
                Ok(SignaturePage {
                    signatures: statuses.into_iter().map(|s| s.signature).collect(),
                    next_cursor,
                })
            }
        }
    }

    /// Fans a window of signatures out to concurrent `getTransaction` calls
    /// (bounded by the shared semaphore). A single 429 anywhere in the
    /// window is surfaced as `UpstreamRateLimited` so the hydrator can back
    /// off and retry the *entire* window (§4.3).
    pub async fn get_transactions(
        &self,
        signatures: &[String],
    ) -> WalletDocResult<Vec<RawTransaction>> {
        if signatures.len() > 100 {
            return Err(WalletDocError::Internal(
                "get_transactions accepts at most 100 signatures per call".to_string(),
            ));
        }
        if !self.breaker.allow_request() {
            return Err(WalletDocError::UpstreamFailure(
                "circuit breaker open".to_string(),
            ));
        }

        let mut handles = Vec::with_capacity(signatures.len());
        for sig in signatures {
            let sig = sig.clone();
            let client = self.inner.url();
            let _ = client; // inner client is cloned via Arc in production wiring; see DESIGN.md
            handles.push(self.fetch_one(sig));
        }

        let results = futures::future::join_all(handles).await;

        let mut out = Vec::with_capacity(results.len());
        for r in results {
            match r {
                Ok(Some(tx)) => out.push(tx),
                Ok(None) => {} // transaction not found / not a version-0 tx we can parse; skip
                Err(WalletDocError::RateLimited { .. }) => {
                    self.upstream_429_count.fetch_add(1, Ordering::Relaxed);
                    return Err(WalletDocError::UpstreamRateLimited { attempts: 1 });
                }
                Err(e) => return Err(e),
            }
        }
        self.breaker.record_success();
        Ok(out)
    }

    async fn fetch_one(&self, signature: String) -> WalletDocResult<Option<RawTransaction>> {
        self.rate_limiter.acquire().await;
        let _permit = self.semaphore.acquire().await.map_err(|_| {
            WalletDocError::Internal("upstream semaphore closed".to_string())
        })?;

        let sig: SolanaSignature = signature
            .parse()
            .map_err(|_| WalletDocError::Internal("invalid signature in batch".to_string()))?;

        let config = solana_client::rpc_config::RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        let result = tokio::time::timeout(
            self.timeout,
            self.inner.get_transaction_with_config(&sig, config),
        )
        .await;

        match result {
            Err(_) => Err(WalletDocError::UpstreamTimeout(self.timeout.as_secs())),
            Ok(Err(e)) => Err(self.classify_client_error(&e)),
            Ok(Ok(tx)) => Ok(super::parse::parse_transaction(signature, tx)),
        }
    }

    fn classify_client_error(&self, err: &solana_client::client_error::ClientError) -> WalletDocError {
        let msg = err.to_string();
        if msg.contains("429") || msg.to_lowercase().contains("too many requests") {
            WalletDocError::RateLimited {
                retry_after_secs: 5,
            }
        } else if msg.contains("5") && msg.contains("00") {
            WalletDocError::UpstreamFailure(msg)
        } else {
            WalletDocError::UpstreamFailure(msg)
        }
    }
}
