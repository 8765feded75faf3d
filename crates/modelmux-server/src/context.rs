//! Construction and lifecycle of the core components.
//!
//! Everything the source treated as a process-wide singleton is an
//! explicit value here, constructed once at startup and passed by
//! reference through this context.

use crate::audit::AuditObserver;
use modelmux_cache::ResponseCache;
use modelmux_core::{FanoutObserver, GatewayConfig, Observer};
use modelmux_metrics::{MetricsAggregator, SocketHub};
use modelmux_pool::ConnectionPool;
use modelmux_router::Router;
use modelmux_worker::{Supervisor, SupervisorConfig, WorkerError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Interval of the provider probe sweep.
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Per-worker grace period during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The explicit wiring of the request plane: one of each core component,
/// shared by the HTTP surface and the maintenance workers.
pub struct CoreContext {
    pub config: GatewayConfig,
    pub router: Arc<Router>,
    pub cache: Arc<ResponseCache>,
    pub pool: Arc<ConnectionPool>,
    pub metrics: Arc<MetricsAggregator>,
    /// Fan-out of every outcome subscriber (metrics, audit log).
    pub observer: Arc<dyn Observer>,
    pub hub: Arc<SocketHub>,
    pub supervisor: Arc<Supervisor>,
    pub admission: Arc<Semaphore>,
    pub started_at: Instant,
}

impl CoreContext {
    /// Builds every component from an already-parsed config.
    pub fn new(config: GatewayConfig) -> Arc<Self> {
        let metrics = Arc::new(MetricsAggregator::new(&config.metrics));
        for descriptor in &config.providers {
            metrics.register_provider(&descriptor.name);
        }

        let pool = Arc::new(ConnectionPool::new(config.pool.clone()));
        let cache = Arc::new(ResponseCache::new(&config.cache));
        let observer: Arc<dyn Observer> = Arc::new(
            FanoutObserver::new()
                .subscribe(Arc::clone(&metrics) as Arc<dyn Observer>)
                .subscribe(Arc::new(AuditObserver)),
        );
        let router = Arc::new(Router::new(
            &config,
            Arc::clone(&pool),
            Arc::clone(&cache),
            Arc::clone(&observer),
        ));
        let hub = Arc::new(SocketHub::new(
            config.metrics.max_ws_connections,
            config.metrics.ws_pong_timeout(),
            config.auth.bearer_token.clone(),
        ));
        let supervisor = Arc::new(Supervisor::new(SupervisorConfig::default()));
        let admission = Arc::new(Semaphore::new(config.request.max_concurrent));

        Arc::new(Self {
            config,
            router,
            cache,
            pool,
            metrics,
            observer,
            hub,
            supervisor,
            admission,
            started_at: Instant::now(),
        })
    }

    /// Starts every maintenance worker under the supervisor:
    /// cache scan, pool idle reap, metrics sampling, dashboard broadcast
    /// (with the stale-socket sweep), provider probes, and the health
    /// monitor.
    pub fn spawn_workers(self: &Arc<Self>) -> Result<(), WorkerError> {
        let cache = Arc::clone(&self.cache);
        let scan_interval = self.config.cache.scan_interval();
        self.supervisor.spawn(
            "cache-scan",
            "removes expired and cold cache entries",
            move |ctx| async move {
                while !ctx.stop.is_stopped() {
                    if ctx.stop.stopped_or(scan_interval).await {
                        break;
                    }
                    cache.scan();
                    cache.adapt();
                    ctx.heartbeat.beat();
                }
                Ok(())
            },
        )?;

        let pool = Arc::clone(&self.pool);
        let reap_interval = self.config.pool.reap_interval();
        self.supervisor.spawn(
            "pool-reaper",
            "retires idle pool entries",
            move |ctx| async move {
                while !ctx.stop.is_stopped() {
                    if ctx.stop.stopped_or(reap_interval).await {
                        break;
                    }
                    pool.reap_idle();
                    ctx.heartbeat.beat();
                }
                Ok(())
            },
        )?;

        let metrics = Arc::clone(&self.metrics);
        let sample_interval = self.config.metrics.sample_interval();
        self.supervisor.spawn(
            "metrics-sampler",
            "advances system and history samples",
            move |ctx| async move {
                while !ctx.stop.is_stopped() {
                    if ctx.stop.stopped_or(sample_interval).await {
                        break;
                    }
                    metrics.sample();
                    ctx.heartbeat.beat();
                }
                Ok(())
            },
        )?;

        let metrics = Arc::clone(&self.metrics);
        let hub = Arc::clone(&self.hub);
        let broadcast_interval = self.config.metrics.broadcast_interval();
        self.supervisor.spawn(
            "metrics-broadcaster",
            "fans comprehensive snapshots out to dashboard sockets",
            move |ctx| async move {
                while !ctx.stop.is_stopped() {
                    if ctx.stop.stopped_or(broadcast_interval).await {
                        break;
                    }
                    let stale = hub.sweep_stale();
                    if !stale.is_empty() {
                        metrics.set_active_connections(hub.count());
                    }
                    if hub.count() > 0 {
                        let message = metrics.comprehensive().to_string();
                        hub.broadcast(&message);
                    }
                    ctx.heartbeat.beat();
                }
                Ok(())
            },
        )?;

        let router = Arc::clone(&self.router);
        self.supervisor.spawn(
            "provider-probe",
            "periodic provider health sweep",
            move |ctx| async move {
                // Sleep first so startup traffic is not judged by a probe
                // against providers that are still warming up.
                while !ctx.stop.stopped_or(PROBE_INTERVAL).await {
                    router.probe_all().await;
                    ctx.heartbeat.beat();
                }
                Ok(())
            },
        )?;

        self.supervisor.start_health_monitor()?;
        Ok(())
    }

    /// Graceful-then-forced shutdown: stop workers, drain the pool.
    /// Returns the number of workers that had to be leaked.
    pub async fn shutdown(&self) -> usize {
        let leaked = self.supervisor.shutdown(SHUTDOWN_TIMEOUT).await;
        self.pool.shutdown();
        leaked
    }
}
