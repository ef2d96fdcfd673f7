//! Integration tests over the axum router, driven with `tower::ServiceExt::oneshot`
//! rather than a bound socket. Covers auth, wallet validation, feature flags
//! and the health endpoint — everything reachable without a live RPC/Redis
//! backend.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use walletdoc::cache::CacheLayer;
use walletdoc::config::{Config, LogFormat};
use walletdoc::http::auth::KeyLimiter;
use walletdoc::http::{build_router, AppState};
use walletdoc::observability::Metrics;
use walletdoc::pipeline::PipelineOrchestrator;
use walletdoc::pricing::{PriceOracle, PriceOracleConfig, SolSpotProvider};
use walletdoc::rpc::UpstreamRpcClient;

const VALID_WALLET: &str = "So11111111111111111111111111111111111111112";
const VALID_KEY: &str = "wd_abcdEFGH0123abcdEFGH0123abcdEFGH";

fn test_config(api_key_required: bool) -> Config {
    Config {
        upstream_rpc_key: "test-key".to_string(),
        max_concurrent_upstream: 8,
        upstream_rps: 20,
        upstream_timeout: Duration::from_secs(5),

        external_price_key: None,
        price_helius_only: false,
        price_sol_spot_only: true,
        external_provider_enabled: false,
        stale_ttl: Duration::from_secs(21600),
        sol_spot_ttl: Duration::from_secs(30),

        position_cache_ttl: Duration::from_secs(900),
        position_cache_max: 100,
        distributed_cache_url: None,

        request_timeout: Duration::from_secs(5),

        sse_keepalive: Duration::from_secs(30),
        sse_max_stream: Duration::from_secs(60),

        api_key_required,
        allowed_origins: Vec::new(),
        rate_limit_per_minute: 50,
        max_concurrent_streams_per_key: 10,

        trades_endpoint_enabled: true,
        positions_endpoint_enabled: true,
        stream_endpoint_enabled: true,

        upstream_rpc_endpoint: "https://api.mainnet-beta.solana.com".to_string(),
        max_signature_pages: Some(1),

        bind_addr: "127.0.0.1:0".to_string(),
        log_format: LogFormat::Json,
        metrics_bind_addr: "127.0.0.1:0".to_string(),
    }
}

fn test_state(config: Config) -> AppState {
    let config = Arc::new(config);
    let rpc = Arc::new(UpstreamRpcClient::new(config.upstream_rpc_endpoint.clone(), &config));
    let sol_spot = SolSpotProvider::new(reqwest::Client::new(), config.sol_spot_ttl);
    let oracle = Arc::new(PriceOracle::new(PriceOracleConfig::from(config.as_ref()), sol_spot));
    let cache = CacheLayer::null(config.position_cache_max);
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

    AppState {
        config,
        rpc,
        oracle,
        orchestrator,
        cache,
        key_limiter,
        metrics,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_reachable_without_auth() {
    let router = build_router(test_state(test_config(true)));
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["features"]["trades_export"], true);
}

#[tokio::test]
async fn trades_export_requires_api_key_when_configured() {
    let router = build_router(test_state(test_config(true)));
    let uri = format!("/v4/trades/export-gpt/{VALID_WALLET}");
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "auth_denied");
}

#[tokio::test]
async fn trades_export_rejects_malformed_api_key() {
    let router = build_router(test_state(test_config(true)));
    let uri = format!("/v4/trades/export-gpt/{VALID_WALLET}");
    let response = router
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("X-Api-Key", "not-a-real-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn trades_export_rejects_invalid_wallet_shape() {
    let router = build_router(test_state(test_config(true)));
    let response = router
        .oneshot(
            Request::builder()
                .uri("/v4/trades/export-gpt/too-short")
                .header("X-Api-Key", VALID_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn trades_export_rejects_unknown_schema_version() {
    let router = build_router(test_state(test_config(true)));
    let uri = format!("/v4/trades/export-gpt/{VALID_WALLET}?schema_version=v9.9.9");
    let response = router
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("X-Api-Key", VALID_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trades_export_returns_feature_disabled_when_flag_off() {
    let mut config = test_config(true);
    config.trades_endpoint_enabled = false;
    let router = build_router(test_state(config));

    let uri = format!("/v4/trades/export-gpt/{VALID_WALLET}");
    let response = router
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("X-Api-Key", VALID_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn anonymous_access_is_allowed_when_api_key_not_required() {
    let router = build_router(test_state(test_config(false)));
    let uri = format!("/v4/trades/export-gpt/{VALID_WALLET}");
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    // No auth header needed; the request proceeds to wallet validation and
    // then attempts a real pipeline run, which will fail against the network
    // inside this sandboxed test — any response other than 401 demonstrates
    // the auth gate was skipped.
    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let router = build_router(test_state(test_config(true)));
    let response = router
        .oneshot(Request::builder().uri("/not-a-real-route").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
