//! Minimal gateway in front of a single provider.
//!
//! Run with:
//!
//! ```console
//! CEREBRAS_API_KEY=... cargo run -p modelmux-server --example minimal_gateway
//! ```
//!
//! Then issue a request:
//!
//! ```console
//! curl -s localhost:8080/anthropic/v1/messages \
//!     -H 'content-type: application/json' \
//!     -d '{"model":"llama-3.3-70b","messages":[{"role":"user","content":"hi"}],"max_tokens":32}'
//! ```

use modelmux_core::GatewayConfig;
use modelmux_server::CoreContext;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("info,modelmux=debug")
        .init();

    let api_key = std::env::var("CEREBRAS_API_KEY").unwrap_or_else(|_| "unset".to_string());
    let config: GatewayConfig = serde_json::from_value(serde_json::json!({
        "providers": [{
            "name": "cerebras",
            "endpoint": "https://api.cerebras.ai/v1",
            "credential": api_key,
            "models": ["llama-3.3-70b", "llama3.1-8b"],
            "priority": 1,
            "vendor": "cerebras",
        }],
        "listen": { "bind_address": "127.0.0.1", "port": 8080 },
    }))
    .expect("static config is valid");

    let ctx = CoreContext::new(config);
    ctx.spawn_workers().expect("worker startup");

    let (addr, server) = modelmux_server::bind(Arc::clone(&ctx))
        .await
        .expect("bind");
    println!("gateway listening on http://{addr}");
    println!("dashboard feed on ws://{addr}/ws");

    let _ = server.await;
}
