//! HTTP gateway for modelmux.
//!
//! The externally visible surface: an Anthropic-compatible messages API,
//! model and provider management endpoints, health and metrics views, and
//! the dashboard WebSocket. Admission control (correlation ids, optional
//! bearer auth, a global concurrency cap, a body-size cap) happens here;
//! everything past admission is the router's dispatch pipeline.

mod audit;
mod context;
mod handlers;
mod streaming;
mod wire;
mod ws;

pub use audit::AuditObserver;
pub use context::CoreContext;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use modelmux_core::{Observer, RequestRecord};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Builds the axum application over a constructed context.
pub fn build_app(ctx: Arc<CoreContext>) -> AxumRouter {
    AxumRouter::new()
        .route("/anthropic/v1/messages", post(handlers::post_messages))
        .route("/anthropic/v1/models", get(handlers::get_models))
        .route("/health", get(handlers::get_health))
        .route("/status", get(handlers::get_status))
        .route("/metrics", get(handlers::get_metrics))
        .route(
            "/metrics/comprehensive",
            get(handlers::get_metrics_comprehensive),
        )
        .route("/metrics/history", get(handlers::get_metrics_history))
        .route(
            "/metrics/performance",
            get(handlers::get_metrics_performance),
        )
        .route(
            "/metrics/provider/:name",
            get(handlers::get_metrics_provider),
        )
        .route("/config", get(handlers::get_config))
        .route("/api-endpoints", get(handlers::get_api_endpoints))
        .route(
            "/providers",
            get(handlers::get_providers).post(handlers::create_provider),
        )
        .route(
            "/providers/:name",
            get(handlers::get_provider)
                .put(handlers::update_provider)
                .delete(handlers::delete_provider),
        )
        .route("/providers/:name/test", post(handlers::test_provider))
        .route("/ws", get(ws::ws_handler))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&ctx),
            record_request,
        ))
        .layer(DefaultBodyLimit::max(ctx.config.request.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Binds the configured listen address and serves in a background task.
/// Returns the bound address (useful with port 0) and the serve handle.
pub async fn bind(
    ctx: Arc<CoreContext>,
) -> std::io::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let address = format!(
        "{}:{}",
        ctx.config.listen.bind_address, ctx.config.listen.port
    );
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let local = listener.local_addr()?;
    let app = build_app(ctx);

    let handle = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            tracing::error!(error = %error, "server task exited");
        }
    });
    tracing::info!(address = %local, "gateway listening");
    Ok((local, handle))
}

/// Posts (endpoint, status, duration) for every completed request.
async fn record_request(
    axum::extract::State(ctx): axum::extract::State<Arc<CoreContext>>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let endpoint = endpoint_label(request.uri().path());
    let started = Instant::now();
    let response = next.run(request).await;
    ctx.observer.on_request(&RequestRecord {
        endpoint,
        status_code: response.status().as_u16(),
        duration: started.elapsed(),
    });
    response
}

fn endpoint_label(path: &str) -> &'static str {
    match path {
        "/anthropic/v1/messages" => "/anthropic/v1/messages",
        "/anthropic/v1/models" => "/anthropic/v1/models",
        "/health" => "/health",
        "/status" => "/status",
        "/metrics" => "/metrics",
        "/metrics/comprehensive" => "/metrics/comprehensive",
        "/metrics/history" => "/metrics/history",
        "/metrics/performance" => "/metrics/performance",
        "/config" => "/config",
        "/ws" => "/ws",
        path if path.starts_with("/metrics/provider/") => "/metrics/provider",
        path if path.starts_with("/providers") => "/providers",
        _ => "other",
    }
}
