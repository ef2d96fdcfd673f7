//! Wallet swap-history ingestion, pricing, FIFO cost-basis and HTTP/SSE
//! export service.

pub mod cache;
pub mod config;
pub mod costbasis;
pub mod domain;
pub mod error;
pub mod http;
pub mod observability;
pub mod pipeline;
pub mod pricing;
pub mod rpc;
pub mod streaming;
pub mod time;
