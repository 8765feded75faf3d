//! Harness: stub upstreams and a bound gateway.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use modelmux_core::{GatewayConfig, ProviderDescriptor, Vendor};
use modelmux_server::CoreContext;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the stub upstream does with the next request.
#[derive(Debug, Clone)]
pub enum StubMode {
    /// Reply 200 with the given text after the given delay.
    Ok { text: String, delay_ms: u64 },
    /// Reply with a bare status code after the given delay.
    Status { code: u16, delay_ms: u64 },
}

struct StubState {
    mode: Mutex<StubMode>,
    hits: AtomicUsize,
}

/// A stub upstream speaking the synthetic (Anthropic-shaped) dialect.
pub struct StubUpstream {
    addr: SocketAddr,
    state: Arc<StubState>,
}

impl StubUpstream {
    pub async fn spawn(mode: StubMode) -> Self {
        let state = Arc::new(StubState {
            mode: Mutex::new(mode),
            hits: AtomicUsize::new(0),
        });

        let app = axum::Router::new()
            .route("/v1/messages", post(stub_messages))
            .route("/v1/models", get(|| async { axum::Json(json!({ "data": [] })) }))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_mode(&self, mode: StubMode) {
        *self.state.mode.lock().unwrap() = mode;
    }

    /// Upstream calls actually received.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

async fn stub_messages(State(state): State<Arc<StubState>>) -> axum::response::Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let mode = state.mode.lock().unwrap().clone();
    match mode {
        StubMode::Ok { text, delay_ms } => {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            axum::Json(json!({
                "content": text,
                "usage": { "input_tokens": 3, "output_tokens": 1 },
            }))
            .into_response()
        }
        StubMode::Status { code, delay_ms } => {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "stub error").into_response()
        }
    }
}

/// A provider descriptor pointing at a stub upstream.
pub fn provider(name: &str, endpoint: &str, priority: u32) -> ProviderDescriptor {
    ProviderDescriptor {
        name: name.to_string(),
        endpoint: endpoint.to_string(),
        credential: "test-key".to_string(),
        group_id: None,
        models: vec!["m".to_string()],
        model_map: Default::default(),
        priority,
        timeout_ms: 2_000,
        max_retries: 3,
        max_rps: None,
        vendor: Vendor::Synthetic,
        input_cost_per_mtok: 0.0,
        output_cost_per_mtok: 0.0,
    }
}

/// A bound gateway plus the HTTP client to talk to it.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub ctx: Arc<CoreContext>,
    pub client: reqwest::Client,
}

impl TestGateway {
    pub async fn spawn(
        providers: Vec<ProviderDescriptor>,
        tweak: impl FnOnce(&mut GatewayConfig),
    ) -> Self {
        let mut config = GatewayConfig {
            providers,
            ..Default::default()
        };
        config.listen.bind_address = "127.0.0.1".to_string();
        config.listen.port = 0;
        config.request.default_timeout_ms = 5_000;
        config.retry.base_delay_ms = 10;
        config.retry.max_delay_ms = 50;
        tweak(&mut config);

        let ctx = CoreContext::new(config);
        ctx.spawn_workers().expect("workers");
        let (addr, _handle) = modelmux_server::bind(Arc::clone(&ctx)).await.expect("bind");

        Self {
            addr,
            ctx,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_messages(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url("/anthropic/v1/messages"))
            .json(body)
            .send()
            .await
            .expect("gateway reachable")
    }

    pub async fn metrics(&self) -> Value {
        self.client
            .get(self.url("/metrics"))
            .send()
            .await
            .expect("metrics reachable")
            .json()
            .await
            .expect("metrics json")
    }

    pub async fn provider_metrics(&self, name: &str) -> Value {
        self.client
            .get(self.url(&format!("/metrics/provider/{name}")))
            .send()
            .await
            .expect("provider metrics reachable")
            .json()
            .await
            .expect("provider metrics json")
    }
}

/// The canonical scenario request body.
pub fn messages_body() -> Value {
    json!({
        "model": "m",
        "messages": [{ "role": "user", "content": "hello" }],
        "max_tokens": 16,
    })
}
