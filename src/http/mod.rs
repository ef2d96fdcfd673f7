//! HTTP Surface (C10, §4.10). Axum router composing auth, per-key rate
//! limiting, wallet validation, and the trades/positions/stream/health
//! routes. Grounded on the LuminaChain API gateway's axum composition
//! (`Router`/`State`/CORS/health) — the teacher repo carries no axum
//! dependency of its own.

pub mod auth;
pub mod handlers;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::{Router, extract::Request};
use serde::Serialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::CacheLayer;
use crate::config::Config;
use crate::error::WalletDocError;
use crate::observability::Metrics;
use crate::pipeline::PipelineOrchestrator;
use crate::pricing::PriceOracle;
use crate::rpc::UpstreamRpcClient;

use self::auth::KeyLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rpc: Arc<UpstreamRpcClient>,
    pub oracle: Arc<PriceOracle>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub cache: CacheLayer,
    pub key_limiter: Arc<KeyLimiter>,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.allowed_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<_> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let timeout = ServiceBuilder::new()
        .layer(axum::error_handling::HandleErrorLayer::new(handle_timeout))
        .timeout(DEFAULT_REQUEST_TIMEOUT);

    // Trades/positions are bounded by the request-wide timeout; the SSE
    // route is exempt (it legitimately runs up to `sse_max_stream`, which
    // can exceed it) and gets only the auth/rate-limit layer.
    let bounded = Router::new()
        .route(
            "/v4/trades/export-gpt/:wallet",
            get(handlers::trades_export),
        )
        .route(
            "/v4/positions/export-gpt/:wallet",
            get(handlers::positions_export),
        )
        .layer(timeout)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let streaming = Router::new()
        .route("/v4/wallet/:wallet/stream", get(handlers::stream_wallet))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(bounded)
        .merge(streaming)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Backstop for the orchestrator's own wall-clock budget (§4.9) — catches a
/// handler that never returns (e.g. stuck upstream call outside the pipeline)
/// at the transport layer.
async fn handle_timeout(err: tower::BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        error_response(WalletDocError::Timeout(DEFAULT_REQUEST_TIMEOUT.as_secs()))
    } else {
        error_response(WalletDocError::Internal(err.to_string()))
    }
}

/// Extracted once auth succeeds, so handlers never re-parse the header.
#[derive(Clone)]
pub struct ApiKey(pub String);

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.config.api_key_required {
        request.extensions_mut().insert(ApiKey("anonymous".to_string()));
        return next.run(request).await;
    }

    let key = match headers.get("X-Api-Key").and_then(|v| v.to_str().ok()) {
        Some(k) if auth::is_valid_api_key(k) => k.to_string(),
        _ => {
            state.metrics.auth_failures_total.inc();
            return error_response(WalletDocError::AuthDenied);
        }
    };

    if let Err(e) = state.key_limiter.check_request(&key) {
        return error_response(e);
    }

    request.extensions_mut().insert(ApiKey(key));
    next.run(request).await
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

/// Maps any `WalletDocError` to the `{error, message, code?, retry_after?}`
/// body (§6.3).
pub fn error_response(err: WalletDocError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody {
        error: err.code(),
        message: err.to_string(),
        code: Some(err.code()),
        retry_after: err.retry_after_secs(),
    };
    let mut response = (status, Json(body)).into_response();
    if let Some(retry_after) = err.retry_after_secs() {
        if let Ok(value) = retry_after.to_string().parse() {
            response.headers_mut().insert("Retry-After", value);
        }
    }
    response
}

pub fn feature_disabled_if(enabled: bool, name: &str) -> Result<(), Response> {
    if enabled {
        Ok(())
    } else {
        Err(error_response(WalletDocError::FeatureDisabled(name.to_string())))
    }
}

pub fn validation_error(message: impl Into<String>) -> Response {
    error_response(WalletDocError::Validation(message.into()))
}

pub fn not_found_response() -> Response {
    error_response(WalletDocError::NotFound)
}

pub fn health_json(body: serde_json::Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// Sentinel the `/health` handler reaches for directly to avoid importing
/// `serde_json::json!` in two places.
pub fn health_body(
    cache_metrics: &crate::cache::CacheMetricsSnapshot,
    config: &Config,
) -> serde_json::Value {
    json!({
        "status": "ok",
        "features": {
            "trades_export": config.trades_endpoint_enabled,
            "positions_export": config.positions_endpoint_enabled,
            "stream": config.stream_endpoint_enabled,
        },
        "cache": {
            "hits": cache_metrics.hits,
            "misses": cache_metrics.misses,
            "stale_serves": cache_metrics.stale_serves,
            "lru_size": cache_metrics.lru_size,
        },
    })
}

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
