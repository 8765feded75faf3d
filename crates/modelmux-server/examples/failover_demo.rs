//! Failover demo: two local stub providers, the primary failing.
//!
//! Boots two stub upstreams speaking the synthetic dialect, puts the
//! gateway in front of them with the failing one at higher priority, and
//! shows requests landing on the backup.
//!
//! Run with:
//!
//! ```console
//! cargo run -p modelmux-server --example failover_demo
//! ```

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use modelmux_core::GatewayConfig;
use modelmux_server::CoreContext;
use std::net::SocketAddr;
use std::sync::Arc;

async fn spawn_stub(healthy: bool) -> SocketAddr {
    let handler = move || async move {
        if healthy {
            axum::Json(serde_json::json!({
                "content": "served by the backup",
                "usage": { "input_tokens": 4, "output_tokens": 5 },
            }))
            .into_response()
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "primary is down").into_response()
        }
    };
    let app = axum::Router::new().route("/v1/messages", post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("info,modelmux=debug")
        .init();

    let primary = spawn_stub(false).await;
    let backup = spawn_stub(true).await;

    let config: GatewayConfig = serde_json::from_value(serde_json::json!({
        "providers": [
            {
                "name": "primary",
                "endpoint": format!("http://{primary}"),
                "credential": "demo",
                "models": ["demo-model"],
                "priority": 1,
                "vendor": "synthetic",
            },
            {
                "name": "backup",
                "endpoint": format!("http://{backup}"),
                "credential": "demo",
                "models": ["demo-model"],
                "priority": 2,
                "vendor": "synthetic",
            },
        ],
        "retry": { "base_delay_ms": 50, "max_delay_ms": 200 },
        "listen": { "bind_address": "127.0.0.1", "port": 0 },
    }))
    .expect("static config is valid");

    let ctx = CoreContext::new(config);
    ctx.spawn_workers().expect("worker startup");
    let (addr, _server) = modelmux_server::bind(Arc::clone(&ctx)).await.expect("bind");

    let client = reqwest::Client::new();
    let reply: serde_json::Value = client
        .post(format!("http://{addr}/anthropic/v1/messages"))
        .json(&serde_json::json!({
            "model": "demo-model",
            "messages": [{ "role": "user", "content": "who is serving this?" }],
            "max_tokens": 32,
        }))
        .send()
        .await
        .expect("gateway reachable")
        .json()
        .await
        .expect("json reply");

    println!(
        "reply from provider '{}': {}",
        reply["provider_used"].as_str().unwrap_or("?"),
        reply["content"][0]["text"].as_str().unwrap_or("?"),
    );

    let health: serde_json::Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .expect("health reachable")
        .json()
        .await
        .expect("health json");
    println!("provider health: {health}");

    ctx.shutdown().await;
}
