//! Composition root: load configuration, wire up the RPC client, price
//! oracle, cache, pipeline orchestrator and HTTP surface, then serve.

use std::sync::Arc;

use walletdoc::cache::{CacheLayer, DistributedCache, NullDistributedCache, RedisCache};
use walletdoc::config::Config;
use walletdoc::http::auth::KeyLimiter;
use walletdoc::http::{build_router, AppState};
use walletdoc::observability::{init_tracing, serve_metrics, Metrics};
use walletdoc::pipeline::PipelineOrchestrator;
use walletdoc::pricing::{PriceOracle, PriceOracleConfig, SolSpotProvider};
use walletdoc::rpc::UpstreamRpcClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    init_tracing(config.log_format);

    let config = Arc::new(config);
    tracing::info!(bind_addr = %config.bind_addr, "starting walletdoc");

    let rpc_endpoint = upstream_endpoint(&config);
    let rpc = Arc::new(UpstreamRpcClient::new(rpc_endpoint, &config));

    let http_client = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .build()?;
    let sol_spot = SolSpotProvider::new(http_client, config.sol_spot_ttl);
    let oracle = Arc::new(PriceOracle::new(PriceOracleConfig::from(config.as_ref()), sol_spot));

    let distributed: Arc<dyn DistributedCache> = match &config.distributed_cache_url {
        Some(url) => Arc::new(RedisCache::connect(url).await.map_err(|e| anyhow::anyhow!(e))?),
        None => Arc::new(NullDistributedCache),
    };
    let cache = CacheLayer::new(config.position_cache_max, distributed);

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        rpc.clone(),
        oracle.clone(),
        config.request_timeout,
        config.max_signature_pages,
    ));

    let metrics = Arc::new(Metrics::new());
    let key_limiter = Arc::new(KeyLimiter::new(
        config.rate_limit_per_minute,
        config.max_concurrent_streams_per_key,
    ));

    let state = AppState {
        config: config.clone(),
        rpc,
        oracle,
        orchestrator,
        cache,
        key_limiter,
        metrics: metrics.clone(),
    };

    let metrics_addr: std::net::SocketAddr = config.metrics_bind_addr.parse()?;
    tokio::spawn(serve_metrics(metrics_addr, metrics));

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(bind_addr = %config.bind_addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn upstream_endpoint(config: &Config) -> String {
    if config.upstream_rpc_endpoint.contains("api-key=") {
        config.upstream_rpc_endpoint.clone()
    } else if config.upstream_rpc_endpoint.contains('?') {
        format!("{}&api-key={}", config.upstream_rpc_endpoint, config.upstream_rpc_key)
    } else {
        format!("{}?api-key={}", config.upstream_rpc_endpoint, config.upstream_rpc_key)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
