//! Upstream RPC Client (C1, §4.1): rate-limited, concurrency-capped,
//! circuit-broken access to the chain provider.

pub mod circuit_breaker;
pub mod client;
pub mod parse;
pub mod rate_limiter;

pub use client::{SignaturePage, UpstreamRpcClient, BATCH_BACKOFF};
