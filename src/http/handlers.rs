//! Route handlers (§4.10). Each cold request runs the pipeline once (via
//! the cache's stale-while-refresh path) and renders the requested schema
//! version.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Extension, Path, Query, State};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info_span;

use crate::domain::{PortfolioSnapshot, Signature, Trade};
use crate::error::WalletDocError;
use crate::observability::redact_wallet;
use crate::pipeline::{CancelToken, PipelineOrchestrator, PipelineOutput};

use super::auth::{is_valid_wallet, ApiKey};
use super::schema::{
    build_compact, TradeExportSchema, TradeRowBase, TradeRowWithValue, TradesExportV070,
    TradesExportV071,
};
use super::{error_response, health_body, not_found_response, validation_error, AppState};

fn validate_wallet(wallet: &str) -> Result<(), Response> {
    if is_valid_wallet(wallet) {
        Ok(())
    } else {
        Err(validation_error(format!(
            "wallet must be 32-44 characters, got {}",
            wallet.chars().count()
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedTrades {
    wallet: String,
    signatures: Vec<Signature>,
    trades: Vec<Trade>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TradesQuery {
    schema_version: Option<String>,
    #[serde(default)]
    refresh: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PositionsQuery {
    #[serde(default)]
    refresh: bool,
}

async fn run_pipeline(orchestrator: &PipelineOrchestrator, wallet: &str) -> Result<PipelineOutput, WalletDocError> {
    orchestrator.run(wallet, None, CancelToken::new()).await
}

pub async fn trades_export(
    State(state): State<AppState>,
    Extension(_key): Extension<ApiKey>,
    Path(wallet): Path<String>,
    Query(query): Query<TradesQuery>,
) -> Response {
    if let Err(resp) = super::feature_disabled_if(state.config.trades_endpoint_enabled, "trades_export") {
        return resp;
    }
    if let Err(resp) = validate_wallet(&wallet) {
        return resp;
    }

    let requested = match query.schema_version.as_deref() {
        Some(raw) => match TradeExportSchema::parse(raw) {
            Some(v) => v,
            None => return validation_error(format!("unknown schema_version {raw}")),
        },
        None => TradeExportSchema::default_version(),
    };

    let span = info_span!("trades_export", wallet = %redact_wallet(&wallet), schema_version = requested.as_str());
    let _enter = span.enter();

    let key = crate::cache::keys::trades_key(&wallet);
    let orchestrator = state.orchestrator.clone();
    let wallet_for_refresh = wallet.clone();
    let cache_for_refresh = state.cache.clone();
    let ttl = state.config.position_cache_ttl;

    let refresh_fn = move || {
        let orchestrator = orchestrator.clone();
        let wallet_for_refresh = wallet_for_refresh.clone();
        let cache_for_refresh = cache_for_refresh.clone();
        async move {
            let output = run_pipeline(&orchestrator, &wallet_for_refresh).await?;
            // A fresh pipeline run may have observed trades the cached
            // positions snapshot doesn't reflect yet; invalidate it rather
            // than serve a snapshot that's silently out of sync (§4.8).
            cache_for_refresh.invalidate_wallet_positions(&wallet_for_refresh).await;
            Ok(CachedTrades {
                wallet: wallet_for_refresh,
                signatures: output.signatures,
                trades: output.trades,
            })
        }
    };

    let outcome = if query.refresh {
        state
            .cache
            .bypass::<CachedTrades, _, _>(&key, ttl, "trades:v1", refresh_fn)
            .await
    } else {
        state
            .cache
            .get_or_refresh::<CachedTrades, _, _>(&key, ttl, "trades:v1", refresh_fn)
            .await
    };

    let cached = match outcome {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    if cached.value.trades.is_empty() && cached.value.signatures.is_empty() {
        return not_found_response();
    }

    render_trades(requested, &cached.value.wallet, &cached.value.signatures, &cached.value.trades)
}

fn render_trades(schema: TradeExportSchema, wallet: &str, signatures: &[Signature], trades: &[Trade]) -> Response {
    match schema {
        TradeExportSchema::V070 => {
            let body = TradesExportV070 {
                wallet: wallet.to_string(),
                signatures: signatures.to_vec(),
                trades: trades.iter().map(TradeRowBase::from_trade).collect(),
                schema_version: schema.as_str().to_string(),
            };
            Json(body).into_response()
        }
        TradeExportSchema::V071TradesValue => {
            let body = TradesExportV071 {
                wallet: wallet.to_string(),
                signatures: signatures.to_vec(),
                trades: trades.iter().map(TradeRowWithValue::from_trade).collect(),
                schema_version: schema.as_str().to_string(),
            };
            Json(body).into_response()
        }
        TradeExportSchema::V072Compact => Json(build_compact(wallet, trades)).into_response(),
    }
}

pub async fn positions_export(
    State(state): State<AppState>,
    Extension(_key): Extension<ApiKey>,
    Path(wallet): Path<String>,
    Query(query): Query<PositionsQuery>,
) -> Response {
    if let Err(resp) = super::feature_disabled_if(state.config.positions_endpoint_enabled, "positions_export") {
        return resp;
    }
    if let Err(resp) = validate_wallet(&wallet) {
        return resp;
    }

    let span = info_span!("positions_export", wallet = %redact_wallet(&wallet));
    let _enter = span.enter();

    let key = crate::cache::keys::snapshot_key(&wallet);
    let orchestrator = state.orchestrator.clone();
    let wallet_for_refresh = wallet.clone();
    let ttl = state.config.position_cache_ttl;

    let refresh_fn = move || {
        let orchestrator = orchestrator.clone();
        let wallet_for_refresh = wallet_for_refresh.clone();
        async move {
            let output = run_pipeline(&orchestrator, &wallet_for_refresh).await?;
            Ok(PortfolioSnapshot {
                wallet: wallet_for_refresh,
                schema_version: crate::domain::POSITIONS_SCHEMA_VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                positions: output.positions,
                summary: output.summary,
                price_sources: output.price_sources,
            })
        }
    };

    let outcome = if query.refresh {
        state
            .cache
            .bypass::<PortfolioSnapshot, _, _>(&key, ttl, crate::domain::POSITIONS_SCHEMA_VERSION, refresh_fn)
            .await
    } else {
        state
            .cache
            .get_or_refresh::<PortfolioSnapshot, _, _>(&key, ttl, crate::domain::POSITIONS_SCHEMA_VERSION, refresh_fn)
            .await
    };

    match outcome {
        Ok(cached) => {
            let mut body = serde_json::to_value(&cached.value).unwrap_or(serde_json::Value::Null);
            if cached.stale {
                if let Some(obj) = body.as_object_mut() {
                    obj.insert("stale".to_string(), serde_json::Value::Bool(true));
                    obj.insert(
                        "age_seconds".to_string(),
                        serde_json::Value::Number(cached.age_seconds.into()),
                    );
                }
            }
            Json(body).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn stream_wallet(
    State(state): State<AppState>,
    Extension(key): Extension<ApiKey>,
    Path(wallet): Path<String>,
) -> Response {
    if let Err(resp) = super::feature_disabled_if(state.config.stream_endpoint_enabled, "stream") {
        return resp;
    }
    if let Err(resp) = validate_wallet(&wallet) {
        return resp;
    }

    let Some(guard) = state.key_limiter.try_reserve_stream(&key.0) else {
        return error_response(WalletDocError::RateLimited { retry_after_secs: 5 });
    };

    state.metrics.active_streams.inc();

    let (tx, rx) = mpsc::channel::<crate::streaming::Frame>(64);
    let ids = crate::streaming::IdSequence::new();
    let stream_id = uuid::Uuid::new_v4().to_string();

    let heartbeat = crate::streaming::spawn_heartbeat(
        tx.clone(),
        ids.clone(),
        state.config.sse_keepalive,
        state.config.sse_max_stream,
    );

    tokio::spawn(run_stream_pipeline(
        state.clone(),
        wallet.clone(),
        tx,
        ids,
        stream_id.clone(),
        guard,
        heartbeat,
        state.config.sse_max_stream,
    ));

    let stream = crate::streaming::frame_stream(rx);
    let mut response = Sse::new(stream).into_response();
    response
        .headers_mut()
        .insert("Cache-Control", "no-cache".parse().unwrap());
    if let Ok(value) = stream_id.parse() {
        response.headers_mut().insert("X-Stream-ID", value);
    }
    response
}

#[allow(clippy::too_many_arguments)]
async fn run_stream_pipeline(
    state: AppState,
    wallet: String,
    tx: mpsc::Sender<crate::streaming::Frame>,
    ids: crate::streaming::IdSequence,
    stream_id: String,
    guard: super::auth::StreamGuard,
    heartbeat: tokio::task::JoinHandle<()>,
    max_stream: Duration,
) {
    use crate::streaming::{Frame, StreamEvent};

    let _ = tx
        .send(Frame {
            id: ids.next(),
            event: StreamEvent::Connected {
                stream_id,
                wallet: wallet.clone(),
                timestamp: chrono::Utc::now(),
            },
        })
        .await;

    let (progress_tx, mut progress_rx) = mpsc::channel(32);
    let start = Instant::now();

    let orchestrator = state.orchestrator.clone();
    let wallet_for_run = wallet.clone();
    let run = tokio::spawn(async move {
        tokio::time::timeout(
            max_stream,
            orchestrator.run(&wallet_for_run, Some(progress_tx), CancelToken::new()),
        )
        .await
        .unwrap_or(Err(WalletDocError::Timeout(max_stream.as_secs())))
    });

    while let Some(progress) = progress_rx.recv().await {
        let _ = tx
            .send(Frame {
                id: ids.next(),
                event: StreamEvent::Progress(progress),
            })
            .await;
    }

    match run.await {
        Ok(Ok(output)) => {
            let _ = tx
                .send(Frame {
                    id: ids.next(),
                    event: StreamEvent::Trades {
                        trades: output.trades,
                        batch_num: 1,
                        total_yielded: output.signatures.len() as u64,
                        has_more: false,
                    },
                })
                .await;
            let _ = tx
                .send(Frame {
                    id: ids.next(),
                    event: StreamEvent::Complete {
                        summary: output.summary,
                        metrics: serde_json::json!({ "rate_limited_partial": output.rate_limited_partial }),
                        elapsed_seconds: start.elapsed().as_secs_f64(),
                    },
                })
                .await;
        }
        Ok(Err(e)) => {
            let _ = tx
                .send(Frame {
                    id: ids.next(),
                    event: StreamEvent::Error { error: e.to_string(), code: e.code(), details: None },
                })
                .await;
        }
        Err(_join_err) => {
            let _ = tx
                .send(Frame {
                    id: ids.next(),
                    event: StreamEvent::Error {
                        error: "pipeline task panicked".to_string(),
                        code: "internal_error",
                        details: None,
                    },
                })
                .await;
        }
    }

    heartbeat.abort();
    drop(guard);
    state.metrics.active_streams.dec();
}

pub async fn health(State(state): State<AppState>) -> Response {
    let metrics = state.cache.metrics();
    Json(health_body(&metrics, &state.config)).into_response()
}
