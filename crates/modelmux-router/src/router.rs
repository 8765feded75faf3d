//! Dispatch pipeline.

use crate::backoff::BackoffSchedule;
use crate::error::RouterError;
use crate::state::{ProviderHandle, ProviderView};
use modelmux_breaker::BreakerState;
use modelmux_cache::ResponseCache;
use modelmux_core::config::{BreakerConfig, GatewayConfig, RetryConfig};
use modelmux_core::{
    AttemptRecord, CacheOutcome, CanonicalRequest, CanonicalResponse, ErrorKind, Observer,
    ProviderDescriptor, ResponseStatus,
};
use modelmux_pool::{ConnectionPool, PoolEntry, PoolError};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Probe sweep timeout per provider.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

enum Selection {
    Chosen(Arc<ProviderHandle>),
    Empty { rate_limited_only: bool },
}

/// Result of probing a single provider, served by the test endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProbeReport {
    pub provider: String,
    pub healthy: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
}

/// Owns the dispatch policy: candidate selection, attempt execution,
/// retry/failover, and outcome recording.
pub struct Router {
    providers: RwLock<HashMap<String, Arc<ProviderHandle>>>,
    pool: Arc<ConnectionPool>,
    cache: Arc<ResponseCache>,
    cache_enabled: bool,
    observer: Arc<dyn Observer>,
    retry: RetryConfig,
    breaker_config: BreakerConfig,
    default_provider: Option<String>,
}

impl Router {
    pub fn new(
        config: &GatewayConfig,
        pool: Arc<ConnectionPool>,
        cache: Arc<ResponseCache>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let router = Self {
            providers: RwLock::new(HashMap::new()),
            pool,
            cache,
            cache_enabled: config.cache.enabled,
            observer,
            retry: config.retry.clone(),
            breaker_config: config.breaker.clone(),
            default_provider: config.default_provider.clone(),
        };
        for descriptor in &config.providers {
            if let Err(error) = router.register(descriptor.clone()) {
                tracing::warn!(error = %error, "skipping provider at startup");
            }
        }
        router
    }

    // ---- registry ----------------------------------------------------

    pub fn register(&self, descriptor: ProviderDescriptor) -> Result<(), RouterError> {
        let mut providers = self.write();
        if providers.contains_key(&descriptor.name) {
            return Err(RouterError::DuplicateProvider(descriptor.name));
        }
        let name = descriptor.name.clone();
        providers.insert(
            name.clone(),
            Arc::new(ProviderHandle::new(descriptor, &self.breaker_config)),
        );
        tracing::info!(provider = %name, "provider registered");
        Ok(())
    }

    /// Replaces an existing provider. Mutable state (breaker, counters)
    /// starts fresh.
    pub fn update(&self, descriptor: ProviderDescriptor) -> Result<(), RouterError> {
        let mut providers = self.write();
        if !providers.contains_key(&descriptor.name) {
            return Err(RouterError::UnknownProvider(descriptor.name));
        }
        let name = descriptor.name.clone();
        providers.insert(
            name.clone(),
            Arc::new(ProviderHandle::new(descriptor, &self.breaker_config)),
        );
        tracing::info!(provider = %name, "provider updated");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), RouterError> {
        let mut providers = self.write();
        if providers.remove(name).is_none() {
            return Err(RouterError::UnknownProvider(name.to_string()));
        }
        tracing::info!(provider = name, "provider removed");
        Ok(())
    }

    pub fn provider(&self, name: &str) -> Option<Arc<ProviderHandle>> {
        self.read().get(name).cloned()
    }

    pub fn views(&self) -> Vec<ProviderView> {
        let mut views: Vec<ProviderView> = self.read().values().map(|h| h.view()).collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    /// Aggregate of per-provider model lists, deduplicated.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self
            .read()
            .values()
            .flat_map(|h| h.descriptor().models.iter().cloned())
            .collect();
        models.sort();
        models.dedup();
        models
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Earliest known rate-window reset across the providers serving a
    /// model; feeds the Retry-After hint on rate-limited replies.
    pub fn earliest_rate_reset(&self, model: &str) -> Option<Duration> {
        let now = Instant::now();
        self.read()
            .values()
            .filter(|handle| handle.adapter().supports(model))
            .filter_map(|handle| handle.adapter().rate_status().reset_at)
            .map(|at| at.saturating_duration_since(now))
            .min()
    }

    // ---- dispatch ----------------------------------------------------

    /// Runs a request to completion: cache, selection, attempts, retries.
    /// Always returns a response; failures are encoded, never thrown.
    pub async fn dispatch(&self, mut request: CanonicalRequest) -> CanonicalResponse {
        let cacheable = self.cache_enabled && !request.params.stream;
        if cacheable {
            if let Some(cached) = self.cache.get(&request.fingerprint) {
                self.observer.on_cache(CacheOutcome::Hit);
                tracing::debug!(
                    correlation_id = %request.correlation_id,
                    fingerprint = %request.fingerprint.prefix(),
                    "served from cache"
                );
                return cached;
            }
            self.observer.on_cache(CacheOutcome::Miss);
        }

        let mut tried: Vec<String> = Vec::new();
        // Groups with a failure this request; later attempts prefer other
        // groups, since failures within a vendor account tend to
        // correlate.
        let mut tried_groups: Vec<String> = Vec::new();
        let mut backoff = BackoffSchedule::new(&self.retry);
        let mut last_failure: Option<CanonicalResponse> = None;

        loop {
            if request.expired() {
                let response = last_failure.unwrap_or_else(|| {
                    CanonicalResponse::local_error(ErrorKind::Cancelled, "deadline exceeded")
                });
                return self.finish(response, &request, &tried);
            }

            let handle = match self.select(&request.model, request.attempt, &tried, &tried_groups)
            {
                Selection::Chosen(handle) => handle,
                Selection::Empty { rate_limited_only } => {
                    let response = last_failure.unwrap_or_else(|| {
                        if rate_limited_only {
                            CanonicalResponse::local_error(
                                ErrorKind::RateLimit,
                                "all candidate providers are rate limited",
                            )
                        } else {
                            CanonicalResponse::local_error(
                                ErrorKind::Server,
                                format!("no provider available for model '{}'", request.model),
                            )
                        }
                    });
                    return self.finish(response, &request, &tried);
                }
            };

            // Breaker gate. A rejection is local: not a provider failure,
            // and selection simply moves on.
            if !handle.breaker().can_execute() {
                tried.push(handle.name().to_string());
                if last_failure.is_none() {
                    last_failure = Some(CanonicalResponse::local_error(
                        ErrorKind::Server,
                        format!("breaker open for provider '{}'", handle.name()),
                    ));
                }
                continue;
            }

            let response = self.execute(&handle, &request).await;
            let kind = response.error_kind;

            match response.status {
                ResponseStatus::Success => {
                    handle.record_success(response.latency_ms);
                    handle.breaker().record_success();
                    let descriptor = handle.descriptor();
                    self.observer.on_attempt(&AttemptRecord {
                        provider: handle.name().to_string(),
                        model: request.model.clone(),
                        outcome: Ok(()),
                        latency: Duration::from_millis(response.latency_ms),
                        tokens: response.tokens,
                        cost: descriptor
                            .cost_estimate(response.tokens.input, response.tokens.output),
                        detail: String::new(),
                    });

                    let mut response = response;
                    if response.model_used.is_empty() {
                        response.model_used = request.model.clone();
                    }
                    if cacheable {
                        self.cache.put(request.fingerprint, response.clone(), None);
                    }
                    return response;
                }
                ResponseStatus::UpstreamError => {
                    let kind = kind.unwrap_or(ErrorKind::Server);
                    // Rate limiting is backpressure, not a fault: it
                    // updates headroom but never feeds the breaker.
                    if kind != ErrorKind::RateLimit {
                        handle.record_failure();
                        handle.breaker().record_failure();
                    }
                    self.observer.on_attempt(&AttemptRecord {
                        provider: handle.name().to_string(),
                        model: request.model.clone(),
                        outcome: Err(kind),
                        latency: Duration::from_millis(response.latency_ms),
                        tokens: response.tokens,
                        cost: 0.0,
                        detail: response.detail.clone(),
                    });
                }
                ResponseStatus::LocalError => {}
            }

            let kind = kind.unwrap_or(ErrorKind::Server);
            tried.push(handle.name().to_string());
            if let Some(group) = &handle.descriptor().group_id {
                if !tried_groups.contains(group) {
                    tried_groups.push(group.clone());
                }
            }

            let budget = handle.descriptor().max_retries.max(1);
            let out_of_attempts = request.attempt + 1 >= budget;
            if !kind.is_retriable() || out_of_attempts {
                return self.finish(response, &request, &tried);
            }
            last_failure = Some(response);

            let delay = backoff.next().unwrap_or_default();
            if Instant::now() + delay >= request.deadline {
                let response = match last_failure.take() {
                    Some(failure) => failure,
                    None => CanonicalResponse::local_error(ErrorKind::Cancelled, "deadline exceeded"),
                };
                return self.finish(response, &request, &tried);
            }
            tokio::time::sleep(delay).await;
            request.attempt += 1;
        }
    }

    /// One attempt against one provider: pool checkout, encoded call,
    /// decode. Transport failures are classified by the adapter.
    async fn execute(&self, handle: &ProviderHandle, request: &CanonicalRequest) -> CanonicalResponse {
        let descriptor = handle.descriptor();
        let attempt_deadline = request
            .deadline
            .min(Instant::now() + descriptor.timeout());

        let entry = match self.pool.acquire(descriptor.host(), attempt_deadline).await {
            Ok(entry) => entry,
            Err(PoolError::AcquireTimeout) => {
                return CanonicalResponse::local_error(
                    ErrorKind::Timeout,
                    "connection pool exhausted until deadline",
                )
            }
            Err(PoolError::ShutDown) => {
                return CanonicalResponse::local_error(ErrorKind::Server, "gateway shutting down")
            }
            Err(PoolError::Client(error)) => {
                return CanonicalResponse::local_error(
                    ErrorKind::Internal,
                    format!("http client construction failed: {error}"),
                )
            }
        };
        let mut checkout = Checkout::new(&self.pool, entry);

        let encoded = handle.adapter().encode(request);
        let url = handle.adapter().url(encoded.path);
        let started = Instant::now();
        let timeout = attempt_deadline.saturating_duration_since(started);

        let Some(client) = checkout.client() else {
            return CanonicalResponse::local_error(ErrorKind::Internal, "pool entry vanished");
        };
        let mut builder = client.post(&url).timeout(timeout).json(&encoded.body);
        for (name, value) in &encoded.headers {
            builder = builder.header(*name, value);
        }

        tracing::debug!(
            correlation_id = %request.correlation_id,
            provider = handle.name(),
            attempt = request.attempt,
            url = %url,
            "dispatching attempt"
        );

        let response = match builder.send().await {
            Ok(upstream) => {
                let status = upstream.status().as_u16();
                let headers = upstream.headers().clone();
                match upstream.bytes().await {
                    Ok(body) => {
                        let latency_ms = started.elapsed().as_millis() as u64;
                        handle.adapter().decode(status, &headers, &body, latency_ms)
                    }
                    Err(error) => CanonicalResponse::upstream_error(
                        handle.adapter().classify_transport(&error),
                        error.to_string(),
                        descriptor.name.clone(),
                        started.elapsed().as_millis() as u64,
                        status,
                    ),
                }
            }
            Err(error) => CanonicalResponse::upstream_error(
                handle.adapter().classify_transport(&error),
                error.to_string(),
                descriptor.name.clone(),
                started.elapsed().as_millis() as u64,
                0,
            ),
        };

        // Transport-level trouble retires the entry; HTTP-level errors
        // leave the connection reusable.
        let reusable = !matches!(
            response.error_kind,
            Some(ErrorKind::Timeout) | Some(ErrorKind::Connection)
        );
        checkout.finish(reusable);
        response
    }

    /// Periodic health sweep: issues each adapter's probe and updates the
    /// provider's healthy flag. Run from a supervised worker.
    pub async fn probe_all(&self) {
        let names = self.provider_names();
        for name in names {
            self.probe_one(&name).await;
        }
    }

    /// Probes a single provider and updates its healthy flag. Returns
    /// `None` for an unknown provider.
    pub async fn probe_one(&self, name: &str) -> Option<ProbeReport> {
        let handle = self.provider(name)?;
        let probe = handle.adapter().probe_request();
        let url = handle.adapter().url(probe.path);
        let started = Instant::now();
        let deadline = started + PROBE_TIMEOUT;

        let entry = match self.pool.acquire(handle.descriptor().host(), deadline).await {
            Ok(entry) => entry,
            Err(_) => return None,
        };
        let mut checkout = Checkout::new(&self.pool, entry);

        let builder = checkout.client().map(|client| {
            let mut builder = client.get(&url).timeout(PROBE_TIMEOUT);
            for (name, value) in &probe.headers {
                builder = builder.header(*name, value);
            }
            builder
        });

        let (reusable, healthy, status_code) = match builder {
            Some(builder) => match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    (true, handle.adapter().probe_ok(status), Some(status))
                }
                Err(_) => (false, false, None),
            },
            None => (true, false, None),
        };
        checkout.finish(reusable);
        if handle.healthy() != healthy {
            tracing::info!(provider = handle.name(), healthy, "probe changed provider health");
        }
        handle.set_healthy(healthy);

        Some(ProbeReport {
            provider: handle.name().to_string(),
            healthy,
            status_code,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    // ---- selection ---------------------------------------------------

    fn select(
        &self,
        model: &str,
        attempt: u32,
        tried: &[String],
        tried_groups: &[String],
    ) -> Selection {
        let providers = self.read();
        let supported: Vec<&Arc<ProviderHandle>> = providers
            .values()
            .filter(|handle| {
                handle.adapter().supports(model) && !tried.iter().any(|t| t == handle.name())
            })
            .collect();

        if supported.is_empty() {
            return Selection::Empty {
                rate_limited_only: false,
            };
        }

        let mut rate_filtered = 0usize;
        let mut candidates: Vec<Arc<ProviderHandle>> = Vec::new();
        for handle in &supported {
            if !handle.adapter().has_rate_headroom() {
                rate_filtered += 1;
                continue;
            }
            if handle.healthy() && handle.breaker_state() != BreakerState::Open {
                candidates.push(Arc::clone(handle));
            }
        }

        // First attempt with nothing eligible: relax the health/breaker
        // filters once so a recovering provider can be probed. The
        // breaker's lazy recovery check decides whether half-open is
        // reachable.
        if candidates.is_empty() && attempt == 0 {
            for handle in &supported {
                if handle.adapter().has_rate_headroom() && handle.breaker().can_execute() {
                    candidates.push(Arc::clone(handle));
                }
            }
        }

        if candidates.is_empty() {
            return Selection::Empty {
                rate_limited_only: rate_filtered > 0 && rate_filtered == supported.len(),
            };
        }

        candidates.sort_by_key(|handle| {
            let descriptor = handle.descriptor();
            let remaining = handle
                .adapter()
                .rate_status()
                .remaining
                .unwrap_or(u64::MAX);
            // Affinity and group spread slot in between priority and the
            // rate/latency keys: the configured default provider wins
            // among equals, and groups that already failed this request
            // sort behind fresh ones.
            let not_affine = self.default_provider.as_deref() != Some(handle.name());
            let group_already_failed = descriptor
                .group_id
                .as_ref()
                .is_some_and(|group| tried_groups.contains(group));
            (
                descriptor.priority,
                not_affine,
                group_already_failed,
                Reverse(remaining),
                handle.p95_latency_ms(),
                handle.name().to_string(),
            )
        });

        Selection::Chosen(Arc::clone(&candidates[0]))
    }

    fn finish(
        &self,
        mut response: CanonicalResponse,
        request: &CanonicalRequest,
        tried: &[String],
    ) -> CanonicalResponse {
        if response.model_used.is_empty() {
            response.model_used = request.model.clone();
        }
        if !response.is_success() {
            let kind = response.error_kind.unwrap_or(ErrorKind::Internal);
            tracing::warn!(
                correlation_id = %request.correlation_id,
                fingerprint = %request.fingerprint.prefix(),
                providers = ?tried,
                attempts = request.attempt + 1,
                kind = kind.as_str(),
                detail = %response.detail,
                "request failed"
            );
        }
        response
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ProviderHandle>>> {
        self.providers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ProviderHandle>>> {
        self.providers.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the pool entry exactly once, even if the request future is
/// dropped mid-flight (client disconnect).
struct Checkout<'a> {
    pool: &'a ConnectionPool,
    entry: Option<PoolEntry>,
}

impl<'a> Checkout<'a> {
    fn new(pool: &'a ConnectionPool, entry: PoolEntry) -> Self {
        Self {
            pool,
            entry: Some(entry),
        }
    }

    fn client(&self) -> Option<&reqwest::Client> {
        self.entry.as_ref().map(PoolEntry::client)
    }

    fn finish(&mut self, ok: bool) {
        if let Some(entry) = self.entry.take() {
            self.pool.release(entry, ok);
        }
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.release(entry, true);
        }
    }
}
