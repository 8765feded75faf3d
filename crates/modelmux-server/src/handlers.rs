//! Route handlers.

use crate::context::CoreContext;
use crate::streaming;
use crate::wire;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use modelmux_core::{ErrorKind, Observer, ProviderDescriptor};
use modelmux_router::RouterError;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Checks the static bearer when one is configured. Both the standard
/// Authorization header and the Anthropic-style x-api-key are accepted.
fn authorize(ctx: &CoreContext, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &ctx.config.auth.bearer_token else {
        return Ok(());
    };

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());

    if bearer == Some(expected.as_str()) || api_key == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(wire::error_response(
            ErrorKind::Auth,
            "missing or invalid credentials",
        ))
    }
}

// ---- messages ---------------------------------------------------------

pub async fn post_messages(
    State(ctx): State<Arc<CoreContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&ctx, &headers) {
        return response;
    }

    // Admission: the concurrency cap rejects synchronously rather than
    // queueing to unbounded depth.
    let Ok(_permit) = ctx.admission.try_acquire() else {
        return wire::error_response(ErrorKind::RateLimit, "gateway at concurrency capacity");
    };

    let request: wire::MessagesRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => return wire::invalid_request(&format!("malformed request body: {error}")),
    };
    if request.model.is_empty() {
        return wire::invalid_request("'model' must not be empty");
    }
    if request.messages.is_empty() {
        return wire::invalid_request("'messages' must not be empty");
    }

    let deadline = wire::request_deadline(ctx.config.request.default_timeout());
    let canonical = request.normalize(deadline);
    let correlation_id = canonical.correlation_id.clone();
    let model = canonical.model.clone();
    let wants_stream = canonical.params.stream;
    let started = Instant::now();

    // If the client disconnects, axum drops this future mid-dispatch: the
    // in-flight upstream call is aborted and the request is observed as
    // cancelled.
    let mut disconnect_guard = DisconnectGuard {
        ctx: Arc::clone(&ctx),
        correlation_id: correlation_id.clone(),
        started,
        armed: true,
    };

    let response = ctx.router.dispatch(canonical).await;
    disconnect_guard.armed = false;

    let mut http_response = if response.is_success() {
        let elapsed = started.elapsed();
        if elapsed.as_millis() as u64 > ctx.config.metrics.slow_request_ms {
            tracing::info!(
                correlation_id = %correlation_id,
                provider = %response.provider_used,
                latency_ms = elapsed.as_millis() as u64,
                "slow request"
            );
        }
        if wants_stream {
            streaming::sse_response(&response)
        } else {
            Json(wire::encode_message(&response)).into_response()
        }
    } else {
        let kind = response.error_kind.unwrap_or(ErrorKind::Internal);
        let retry_after = if kind == ErrorKind::RateLimit {
            ctx.router.earliest_rate_reset(&model)
        } else {
            None
        };
        wire::error_response_with_hint(kind, &response.detail, retry_after)
    };

    if let Ok(value) = axum::http::HeaderValue::from_str(&correlation_id) {
        http_response
            .headers_mut()
            .insert("x-correlation-id", value);
    }
    http_response
}

/// Records a cancelled request when the handler future is dropped before
/// the dispatch finished (client went away).
struct DisconnectGuard {
    ctx: Arc<CoreContext>,
    correlation_id: String,
    started: Instant,
    armed: bool,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(
            correlation_id = %self.correlation_id,
            "client disconnected before reply; request cancelled"
        );
        self.ctx.observer.on_request(&modelmux_core::RequestRecord {
            endpoint: "/anthropic/v1/messages",
            status_code: 499,
            duration: self.started.elapsed(),
        });
    }
}

// ---- models -----------------------------------------------------------

pub async fn get_models(
    State(ctx): State<Arc<CoreContext>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&ctx, &headers) {
        return response;
    }
    let data: Vec<_> = ctx
        .router
        .models()
        .into_iter()
        .map(|id| json!({ "type": "model", "id": id }))
        .collect();
    Json(json!({ "data": data, "has_more": false })).into_response()
}

/// Machine-readable catalog of the HTTP surface.
pub async fn get_api_endpoints() -> Response {
    Json(json!({
        "name": "modelmux",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            { "method": "POST", "path": "/anthropic/v1/messages", "description": "Anthropic-compatible messages API" },
            { "method": "GET", "path": "/anthropic/v1/models", "description": "aggregated model list" },
            { "method": "GET", "path": "/health", "description": "liveness and per-provider readiness" },
            { "method": "GET", "path": "/status", "description": "uptime, providers, workers" },
            { "method": "GET", "path": "/config", "description": "running config, secrets redacted" },
            { "method": "GET", "path": "/metrics", "description": "summary metrics" },
            { "method": "GET", "path": "/metrics/comprehensive", "description": "full dashboard snapshot" },
            { "method": "GET", "path": "/metrics/history", "description": "trend-line rings" },
            { "method": "GET", "path": "/metrics/performance", "description": "per-endpoint latency profile" },
            { "method": "GET", "path": "/metrics/provider/{name}", "description": "one provider's metrics" },
            { "method": "GET", "path": "/providers", "description": "registered providers" },
            { "method": "POST", "path": "/providers", "description": "register a provider" },
            { "method": "GET", "path": "/providers/{name}", "description": "one provider" },
            { "method": "PUT", "path": "/providers/{name}", "description": "replace a provider" },
            { "method": "DELETE", "path": "/providers/{name}", "description": "remove a provider" },
            { "method": "POST", "path": "/providers/{name}/test", "description": "one-shot health probe" },
            { "method": "GET", "path": "/ws", "description": "dashboard metrics feed (websocket)" },
        ],
    }))
    .into_response()
}

// ---- health & status --------------------------------------------------

pub async fn get_health(State(ctx): State<Arc<CoreContext>>) -> Response {
    let providers: Vec<_> = ctx
        .router
        .views()
        .into_iter()
        .map(|view| {
            json!({
                "name": view.name,
                "healthy": view.healthy,
                "breaker_state": view.breaker_state,
            })
        })
        .collect();
    Json(json!({ "status": "ok", "providers": providers })).into_response()
}

pub async fn get_status(State(ctx): State<Arc<CoreContext>>) -> Response {
    let workers: Vec<_> = ctx
        .supervisor
        .list()
        .into_iter()
        .map(|info| {
            json!({
                "name": info.name,
                "status": info.status.as_str(),
                "operations_completed": info.operations_completed,
                "uptime_s": info.uptime.map(|u| u.as_secs()),
                "last_error": info.last_error,
            })
        })
        .collect();
    Json(json!({
        "uptime_s": ctx.started_at.elapsed().as_secs(),
        "providers": ctx.router.provider_names(),
        "workers": workers,
    }))
    .into_response()
}

// ---- metrics ----------------------------------------------------------

pub async fn get_metrics(State(ctx): State<Arc<CoreContext>>) -> Response {
    let mut summary = ctx.metrics.summary();
    let cache = ctx.cache.stats();
    let pool = ctx.pool.stats();
    if let Some(map) = summary.as_object_mut() {
        map.insert(
            "cache_store".to_string(),
            json!({
                "entries": cache.entries,
                "bytes": cache.bytes,
                "hits": cache.hits,
                "misses": cache.misses,
                "evictions": cache.evictions,
                "expirations": cache.expirations,
                "hit_rate": cache.hit_rate,
            }),
        );
        map.insert(
            "pool".to_string(),
            json!({
                "total": pool.total,
                "idle": pool.idle,
                "in_flight": pool.in_flight,
                "created": pool.created,
                "reused": pool.reused,
                "retired": pool.retired,
            }),
        );
    }
    Json(summary).into_response()
}

pub async fn get_metrics_comprehensive(State(ctx): State<Arc<CoreContext>>) -> Response {
    Json(ctx.metrics.comprehensive()).into_response()
}

pub async fn get_metrics_performance(State(ctx): State<Arc<CoreContext>>) -> Response {
    Json(ctx.metrics.performance()).into_response()
}

/// Read-only view of the running configuration with secrets redacted.
pub async fn get_config(State(ctx): State<Arc<CoreContext>>) -> Response {
    let mut value = match serde_json::to_value(&ctx.config) {
        Ok(value) => value,
        Err(error) => {
            return wire::error_response(
                ErrorKind::Internal,
                &format!("config serialization failed: {error}"),
            )
        }
    };
    if let Some(providers) = value
        .get_mut("providers")
        .and_then(serde_json::Value::as_array_mut)
    {
        for provider in providers {
            if let Some(object) = provider.as_object_mut() {
                object.insert("credential".to_string(), json!("***"));
            }
        }
    }
    if let Some(auth) = value
        .get_mut("auth")
        .and_then(serde_json::Value::as_object_mut)
    {
        let enabled = auth
            .get("bearer_token")
            .map(|token| !token.is_null())
            .unwrap_or(false);
        auth.clear();
        auth.insert("enabled".to_string(), json!(enabled));
    }
    Json(value).into_response()
}

pub async fn get_metrics_history(State(ctx): State<Arc<CoreContext>>) -> Response {
    Json(ctx.metrics.history()).into_response()
}

pub async fn get_metrics_provider(
    State(ctx): State<Arc<CoreContext>>,
    Path(name): Path<String>,
) -> Response {
    match ctx.metrics.provider_detail(&name) {
        Some(detail) => Json(detail).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "type": "error",
                "error": { "type": "not_found_error", "message": format!("unknown provider '{name}'") },
            })),
        )
            .into_response(),
    }
}

// ---- provider CRUD (in-memory; not preserved across restarts) ---------

pub async fn get_providers(State(ctx): State<Arc<CoreContext>>) -> Response {
    Json(json!({ "providers": ctx.router.views() })).into_response()
}

pub async fn get_provider(
    State(ctx): State<Arc<CoreContext>>,
    Path(name): Path<String>,
) -> Response {
    match ctx.router.provider(&name) {
        Some(handle) => Json(handle.view()).into_response(),
        None => not_found(&name),
    }
}

pub async fn create_provider(
    State(ctx): State<Arc<CoreContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&ctx, &headers) {
        return response;
    }
    let descriptor: ProviderDescriptor = match serde_json::from_slice(&body) {
        Ok(descriptor) => descriptor,
        Err(error) => return wire::invalid_request(&format!("malformed descriptor: {error}")),
    };
    let name = descriptor.name.clone();
    match ctx.router.register(descriptor) {
        Ok(()) => {
            ctx.metrics.register_provider(&name);
            (StatusCode::CREATED, Json(json!({ "created": name }))).into_response()
        }
        Err(RouterError::DuplicateProvider(name)) => (
            StatusCode::CONFLICT,
            Json(json!({
                "type": "error",
                "error": { "type": "invalid_request_error", "message": format!("provider '{name}' already exists") },
            })),
        )
            .into_response(),
        Err(RouterError::UnknownProvider(_)) => {
            wire::error_response(ErrorKind::Internal, "unexpected registry state")
        }
    }
}

pub async fn update_provider(
    State(ctx): State<Arc<CoreContext>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&ctx, &headers) {
        return response;
    }
    let mut descriptor: ProviderDescriptor = match serde_json::from_slice(&body) {
        Ok(descriptor) => descriptor,
        Err(error) => return wire::invalid_request(&format!("malformed descriptor: {error}")),
    };
    descriptor.name = name.clone();
    match ctx.router.update(descriptor) {
        Ok(()) => Json(json!({ "updated": name })).into_response(),
        Err(_) => not_found(&name),
    }
}

pub async fn delete_provider(
    State(ctx): State<Arc<CoreContext>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(response) = authorize(&ctx, &headers) {
        return response;
    }
    match ctx.router.remove(&name) {
        Ok(()) => {
            ctx.metrics.remove_provider(&name);
            Json(json!({ "deleted": name })).into_response()
        }
        Err(_) => not_found(&name),
    }
}

/// One-shot health probe against a single provider.
pub async fn test_provider(
    State(ctx): State<Arc<CoreContext>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(response) = authorize(&ctx, &headers) {
        return response;
    }
    match ctx.router.probe_one(&name).await {
        Some(report) => Json(report).into_response(),
        None => not_found(&name),
    }
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "type": "error",
            "error": { "type": "not_found_error", "message": format!("unknown provider '{name}'") },
        })),
    )
        .into_response()
}
