//! Observability (C12, §4.12, §10.5). Request/pipeline metrics exported via
//! `prometheus` on a side listener, plus `tracing`/`tracing-subscriber`
//! structured logging setup. Grounded on the teacher's `services::metrics`
//! module (a `Registry` of named counters/gauges/histograms updated by the
//! rest of the service) adapted from its `tokio_metrics`/`sysinfo` runtime
//! stats to the request/pipeline counters this spec enumerates.

use std::net::SocketAddr;

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormat;

pub struct Metrics {
    pub registry: Registry,

    pub requests_total: IntCounterVec,
    pub auth_failures_total: IntCounter,
    pub responses_4xx_total: IntCounter,
    pub responses_5xx_total: IntCounter,

    pub upstream_calls_total: IntCounter,
    pub upstream_429_total: IntCounter,
    pub extractor_fallbacks_total: IntCounter,

    pub cache_hits_total: IntCounter,
    pub cache_misses_total: IntCounter,
    pub cache_stale_serves_total: IntCounter,
    pub cache_refresh_triggers_total: IntCounter,
    pub cache_refresh_errors_total: IntCounter,

    pub active_streams: IntGauge,
    pub in_flight_pipelines: IntGauge,
    pub cache_size: IntGauge,

    pub phase_duration_seconds: HistogramVec,
    pub request_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("walletdoc_requests_total", "HTTP requests handled, by route and status"),
            &["route", "status"],
        )
        .unwrap();
        let auth_failures_total =
            IntCounter::new("walletdoc_auth_failures_total", "Requests rejected by API-key auth").unwrap();
        let responses_4xx_total =
            IntCounter::new("walletdoc_responses_4xx_total", "Responses with a 4xx status").unwrap();
        let responses_5xx_total =
            IntCounter::new("walletdoc_responses_5xx_total", "Responses with a 5xx status").unwrap();

        let upstream_calls_total =
            IntCounter::new("walletdoc_upstream_calls_total", "Calls made to the upstream RPC provider").unwrap();
        let upstream_429_total =
            IntCounter::new("walletdoc_upstream_429_total", "429 responses observed from upstream").unwrap();
        let extractor_fallbacks_total = IntCounter::new(
            "walletdoc_extractor_fallbacks_total",
            "Trades extracted via the token-transfer fallback path rather than a structured swap event",
        )
        .unwrap();

        let cache_hits_total =
            IntCounter::new("walletdoc_cache_hits_total", "Cache reads that found a value").unwrap();
        let cache_misses_total =
            IntCounter::new("walletdoc_cache_misses_total", "Cache reads that found nothing").unwrap();
        let cache_stale_serves_total = IntCounter::new(
            "walletdoc_cache_stale_serves_total",
            "Cache reads that served a stale value while a refresh was triggered",
        )
        .unwrap();
        let cache_refresh_triggers_total = IntCounter::new(
            "walletdoc_cache_refresh_triggers_total",
            "Background refreshes spawned",
        )
        .unwrap();
        let cache_refresh_errors_total =
            IntCounter::new("walletdoc_cache_refresh_errors_total", "Background refreshes that failed").unwrap();

        let active_streams =
            IntGauge::new("walletdoc_active_streams", "SSE streams currently open").unwrap();
        let in_flight_pipelines =
            IntGauge::new("walletdoc_in_flight_pipelines", "Pipeline runs currently executing").unwrap();
        let cache_size = IntGauge::new("walletdoc_cache_size", "Entries currently held in the in-process LRU").unwrap();

        let phase_duration_seconds = HistogramVec::new(
            HistogramOpts::new("walletdoc_phase_duration_seconds", "Pipeline phase duration"),
            &["phase"],
        )
        .unwrap();
        let request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "walletdoc_request_duration_seconds",
            "Total HTTP request handling duration",
        ))
        .unwrap();

        macro_rules! register_all {
            ($($m:expr),* $(,)?) => {
                $(registry.register(Box::new($m.clone())).ok();)*
            };
        }
        register_all!(
            requests_total,
            auth_failures_total,
            responses_4xx_total,
            responses_5xx_total,
            upstream_calls_total,
            upstream_429_total,
            extractor_fallbacks_total,
            cache_hits_total,
            cache_misses_total,
            cache_stale_serves_total,
            cache_refresh_triggers_total,
            cache_refresh_errors_total,
            active_streams,
            in_flight_pipelines,
            cache_size,
            phase_duration_seconds,
            request_duration_seconds,
        );

        Self {
            registry,
            requests_total,
            auth_failures_total,
            responses_4xx_total,
            responses_5xx_total,
            upstream_calls_total,
            upstream_429_total,
            extractor_fallbacks_total,
            cache_hits_total,
            cache_misses_total,
            cache_stale_serves_total,
            cache_refresh_triggers_total,
            cache_refresh_errors_total,
            active_streams,
            in_flight_pipelines,
            cache_size,
            phase_duration_seconds,
            request_duration_seconds,
        }
    }

    pub fn record_status(&self, route: &str, status: u16) {
        self.requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
        if (400..500).contains(&status) {
            self.responses_4xx_total.inc();
        } else if status >= 500 {
            self.responses_5xx_total.inc();
        }
    }

    pub fn record_cache_snapshot(&self, snapshot: &crate::cache::CacheMetricsSnapshot) {
        self.cache_size.set(snapshot.lru_size as i64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `/metrics` on its own listener (§10.5: a side HTTP server bound to
/// `METRICS_BIND_ADDR`, independent of the main API router).
pub async fn serve_metrics(bind_addr: SocketAddr, metrics: std::sync::Arc<Metrics>) {
    use axum::{routing::get, Router};

    async fn handler(
        axum::extract::State(metrics): axum::extract::State<std::sync::Arc<Metrics>>,
    ) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let families = metrics.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).ok();
        String::from_utf8(buf).unwrap_or_default()
    }

    let app = Router::new().route("/metrics", get(handler)).with_state(metrics);
    match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "metrics listener exited");
            }
        }
        Err(e) => tracing::error!(error = %e, %bind_addr, "failed to bind metrics listener"),
    }
}

/// Initializes the global `tracing` subscriber (§10.4): JSON in production,
/// pretty-printed in local dev, both driven by `RUST_LOG` via `EnvFilter`.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => {
            subscriber.json().with_current_span(true).init();
        }
        LogFormat::Pretty => {
            subscriber.pretty().init();
        }
    }
}

/// Redacts a wallet address to `first8...last4` for log/span fields (§10.4).
pub fn redact_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() <= 12 {
        return wallet.to_string();
    }
    let first: String = chars[..8].iter().collect();
    let last: String = chars[chars.len() - 4..].iter().collect();
    format!("{first}...{last}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_wallet_keeps_first8_last4() {
        let wallet = "ABCDEFGHIJKLMNOPQRSTUVWXYZ123456789";
        let redacted = redact_wallet(wallet);
        assert!(redacted.starts_with("ABCDEFGH"));
        assert!(redacted.ends_with("6789"));
        assert!(redacted.contains("..."));
    }

    #[test]
    fn redact_wallet_leaves_short_strings_alone() {
        assert_eq!(redact_wallet("short"), "short");
    }

    #[test]
    fn metrics_construct_without_panicking() {
        let metrics = Metrics::new();
        metrics.record_status("/health", 200);
        assert_eq!(metrics.requests_total.with_label_values(&["/health", "200"]).get(), 1);
    }
}
