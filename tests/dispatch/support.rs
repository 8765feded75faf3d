//! Harness for router-level tests.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use modelmux_cache::ResponseCache;
use modelmux_core::{
    AttemptRecord, CacheOutcome, CanonicalRequest, ErrorKind, GatewayConfig, GenerationParams,
    Message, Observer, ProviderDescriptor, RequestRecord, Vendor,
};
use modelmux_pool::ConnectionPool;
use modelmux_router::Router;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stub upstream whose status code can be flipped at runtime. A 0 status
/// means "reply 200 with the canned message".
pub struct Stub {
    addr: SocketAddr,
    status: Arc<AtomicU16>,
    hits: Arc<AtomicUsize>,
}

impl Stub {
    pub async fn ok() -> Self {
        Self::with_status(0).await
    }

    pub async fn failing(status: u16) -> Self {
        Self::with_status(status).await
    }

    async fn with_status(status: u16) -> Self {
        let status = Arc::new(AtomicU16::new(status));
        let hits = Arc::new(AtomicUsize::new(0));

        #[derive(Clone)]
        struct StubState {
            status: Arc<AtomicU16>,
            hits: Arc<AtomicUsize>,
        }

        async fn handle(State(state): State<StubState>) -> axum::response::Response {
            state.hits.fetch_add(1, Ordering::SeqCst);
            match state.status.load(Ordering::SeqCst) {
                0 => axum::Json(json!({
                    "content": "pong",
                    "usage": { "input_tokens": 2, "output_tokens": 1 },
                }))
                .into_response(),
                429 => (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", "60")],
                    "limited",
                )
                    .into_response(),
                code => (
                    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    "stub failure",
                )
                    .into_response(),
            }
        }

        let app = axum::Router::new()
            .route("/v1/messages", post(handle))
            .with_state(StubState {
                status: Arc::clone(&status),
                hits: Arc::clone(&hits),
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, status, hits }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Observer that tallies attempt outcomes.
#[derive(Default)]
pub struct CountingObserver {
    pub successes: AtomicUsize,
    pub failures: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub cache_misses: AtomicUsize,
}

impl Observer for CountingObserver {
    fn on_attempt(&self, record: &AttemptRecord) {
        match record.outcome {
            Ok(()) => self.successes.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.failures.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn on_request(&self, _record: &RequestRecord) {}

    fn on_cache(&self, outcome: CacheOutcome) {
        match outcome {
            CacheOutcome::Hit => self.cache_hits.fetch_add(1, Ordering::SeqCst),
            CacheOutcome::Miss => self.cache_misses.fetch_add(1, Ordering::SeqCst),
        };
    }
}

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

pub struct Harness {
    pub router: Router,
    pub observer: Arc<CountingObserver>,
}

pub fn harness(
    providers: Vec<ProviderDescriptor>,
    tweak: impl FnOnce(&mut GatewayConfig),
) -> Harness {
    let mut config = GatewayConfig {
        providers,
        ..Default::default()
    };
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    tweak(&mut config);

    let observer = Arc::new(CountingObserver::default());
    let router = Router::new(
        &config,
        Arc::new(ConnectionPool::new(config.pool.clone())),
        Arc::new(ResponseCache::new(&config.cache)),
        Arc::clone(&observer) as Arc<dyn Observer>,
    );
    Harness { router, observer }
}

pub fn request(text: &str) -> CanonicalRequest {
    CanonicalRequest::new(
        "m",
        vec![Message::user(text)],
        None,
        GenerationParams {
            max_tokens: Some(16),
            ..Default::default()
        },
        Instant::now() + Duration::from_secs(10),
    )
}
