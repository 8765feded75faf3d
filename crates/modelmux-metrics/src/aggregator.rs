//! The aggregator.

use crate::history::HistoryRing;
use modelmux_core::config::MetricsConfig;
use modelmux_core::{AttemptRecord, CacheOutcome, ErrorKind, Observer, RequestRecord};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Latency samples kept per provider and per endpoint.
const LATENCY_WINDOW: usize = 512;

/// Timestamped events kept per series for rate windows; pruned to one
/// hour, so rates beyond this many events are approximate.
const EVENT_WINDOW: usize = 4_096;

/// Recent terminal errors kept for the dashboard.
const ERROR_HISTORY: usize = 100;

const HOUR: Duration = Duration::from_secs(3_600);

#[derive(Default)]
struct ProviderStats {
    requests: u64,
    successes: u64,
    failures_by_kind: HashMap<ErrorKind, u64>,
    latencies_ms: VecDeque<u64>,
    tokens_input: u64,
    tokens_output: u64,
    /// (completion instant, cost) for rate and cost windows.
    events: VecDeque<(Instant, f64)>,
}

impl ProviderStats {
    fn record(&mut self, record: &AttemptRecord, now: Instant) {
        self.requests += 1;
        match record.outcome {
            Ok(()) => {
                self.successes += 1;
                self.tokens_input += record.tokens.input;
                self.tokens_output += record.tokens.output;
            }
            Err(kind) => {
                *self.failures_by_kind.entry(kind).or_insert(0) += 1;
            }
        }
        push_bounded(&mut self.latencies_ms, record.latency.as_millis() as u64);
        push_event(&mut self.events, (now, record.cost), now);
    }

    fn failures(&self) -> u64 {
        self.failures_by_kind.values().sum()
    }

    fn view(&self, now: Instant) -> Value {
        let failures = self.failures();
        let success_rate = if self.requests > 0 {
            self.successes as f64 / self.requests as f64
        } else {
            0.0
        };
        let mut errors = Map::new();
        for (kind, count) in &self.failures_by_kind {
            errors.insert(kind.as_str().to_string(), json!(count));
        }
        json!({
            "requests": self.requests,
            "successes": self.successes,
            "failures": failures,
            "success_rate": success_rate,
            "requests_per_second": count_within(&self.events, now, Duration::from_secs(1)),
            "requests_per_minute": count_within(&self.events, now, Duration::from_secs(60)),
            "requests_per_hour": count_within(&self.events, now, HOUR),
            "avg_latency_ms": mean(&self.latencies_ms),
            "p50_latency_ms": percentile(&self.latencies_ms, 0.50),
            "p95_latency_ms": percentile(&self.latencies_ms, 0.95),
            "p99_latency_ms": percentile(&self.latencies_ms, 0.99),
            "errors": errors,
            "tokens": {
                "input": self.tokens_input,
                "output": self.tokens_output,
                "total": self.tokens_input + self.tokens_output,
            },
            "cost_per_hour": cost_within(&self.events, now, HOUR),
        })
    }
}

#[derive(Default)]
struct EndpointStats {
    requests: u64,
    by_status_class: HashMap<u16, u64>,
    durations_ms: VecDeque<u64>,
    events: VecDeque<(Instant, f64)>,
}

impl EndpointStats {
    fn record(&mut self, record: &RequestRecord, now: Instant) {
        self.requests += 1;
        *self
            .by_status_class
            .entry(record.status_code / 100)
            .or_insert(0) += 1;
        push_bounded(&mut self.durations_ms, record.duration.as_millis() as u64);
        push_event(&mut self.events, (now, 0.0), now);
    }

    fn view(&self, now: Instant) -> Value {
        let mut statuses = Map::new();
        for (class, count) in &self.by_status_class {
            statuses.insert(format!("{class}xx"), json!(count));
        }
        json!({
            "requests": self.requests,
            "by_status": statuses,
            "requests_per_second": count_within(&self.events, now, Duration::from_secs(1)),
            "avg_duration_ms": mean(&self.durations_ms),
            "p95_duration_ms": percentile(&self.durations_ms, 0.95),
            "p99_duration_ms": percentile(&self.durations_ms, 0.99),
        })
    }
}

struct ErrorEvent {
    at_ms: u64,
    provider: String,
    kind: ErrorKind,
    detail: String,
}

struct HistorySet {
    avg_response_ms: HistoryRing,
    success_rate: HistoryRing,
    requests_per_minute: HistoryRing,
    cpu_percent: HistoryRing,
    memory_percent: HistoryRing,
}

impl HistorySet {
    fn new(points: usize) -> Self {
        Self {
            avg_response_ms: HistoryRing::new(points),
            success_rate: HistoryRing::new(points),
            requests_per_minute: HistoryRing::new(points),
            cpu_percent: HistoryRing::new(points),
            memory_percent: HistoryRing::new(points),
        }
    }

    fn view(&self) -> Value {
        json!({
            "avg_response_ms": self.avg_response_ms.points(),
            "success_rate": self.success_rate.points(),
            "requests_per_minute": self.requests_per_minute.points(),
            "cpu_percent": self.cpu_percent.points(),
            "memory_percent": self.memory_percent.points(),
        })
    }
}

struct SystemSampler {
    system: System,
    pid: Option<Pid>,
    cpu_percent: f64,
    memory_bytes: u64,
    memory_percent: f64,
}

impl SystemSampler {
    fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            cpu_percent: 0.0,
            memory_bytes: 0,
            memory_percent: 0.0,
        }
    }

    fn refresh(&mut self) {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.cpu_percent = f64::from(self.system.global_cpu_usage());
        if let Some(pid) = self.pid {
            self.system
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = self.system.process(pid) {
                self.memory_bytes = process.memory();
            }
        }
        let total = self.system.total_memory();
        self.memory_percent = if total > 0 {
            self.memory_bytes as f64 / total as f64 * 100.0
        } else {
            0.0
        };
    }
}

/// Centralized observability: counters from every stage of the request
/// plane, windowed derivations, and the broadcast snapshot.
///
/// Ingestion is non-blocking on the hot path: per-series locks guard only
/// short in-memory updates.
pub struct MetricsAggregator {
    started_at: Instant,
    seq: AtomicU64,
    providers: RwLock<HashMap<String, Mutex<ProviderStats>>>,
    endpoints: RwLock<HashMap<&'static str, Mutex<EndpointStats>>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    active_connections: AtomicU64,
    system: Mutex<SystemSampler>,
    history: Mutex<HistorySet>,
    errors: Mutex<VecDeque<ErrorEvent>>,
}

impl MetricsAggregator {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            started_at: Instant::now(),
            seq: AtomicU64::new(0),
            providers: RwLock::new(HashMap::new()),
            endpoints: RwLock::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            system: Mutex::new(SystemSampler::new()),
            history: Mutex::new(HistorySet::new(config.history_points)),
            errors: Mutex::new(VecDeque::with_capacity(ERROR_HISTORY)),
        }
    }

    /// Pre-creates a provider series so it shows up in snapshots before
    /// any traffic arrives.
    pub fn register_provider(&self, name: &str) {
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        providers
            .entry(name.to_string())
            .or_insert_with(|| Mutex::new(ProviderStats::default()));
    }

    pub fn remove_provider(&self, name: &str) {
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        providers.remove(name);
    }

    /// Updated by the socket hub on register/close.
    pub fn set_active_connections(&self, count: usize) {
        self.active_connections
            .store(count as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Refreshes system state and advances every history series by one
    /// point. Invoked by the sampling worker once per interval.
    pub fn sample(&self) {
        let now = Instant::now();
        let (cpu_percent, memory_percent) = {
            let mut sampler = self.system.lock().unwrap_or_else(|e| e.into_inner());
            sampler.refresh();
            (sampler.cpu_percent, sampler.memory_percent)
        };

        let (avg_ms, success_rate, rpm) = self.fleet_rollup(now);

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.avg_response_ms.push(avg_ms);
        history.success_rate.push(success_rate);
        history.requests_per_minute.push(rpm);
        history.cpu_percent.push(cpu_percent);
        history.memory_percent.push(memory_percent);
    }

    /// `/metrics`: the compact summary view.
    pub fn summary(&self) -> Value {
        let now = Instant::now();
        let (avg_ms, success_rate, _) = self.fleet_rollup(now);
        let mut providers = Map::new();
        {
            let guard = self.providers.read().unwrap_or_else(|e| e.into_inner());
            for (name, stats) in guard.iter() {
                let stats = stats.lock().unwrap_or_else(|e| e.into_inner());
                providers.insert(
                    name.clone(),
                    json!({
                        "requests": stats.requests,
                        "successes": stats.successes,
                        "failures": stats.failures(),
                        "success_rate": if stats.requests > 0 {
                            stats.successes as f64 / stats.requests as f64
                        } else {
                            0.0
                        },
                    }),
                );
            }
        }
        json!({
            "uptime_s": self.uptime().as_secs(),
            "avg_latency_ms": avg_ms,
            "success_rate": success_rate,
            "total_rps": self.total_rps(now),
            "cache": {
                "hits": self.cache_hits.load(Ordering::Relaxed),
                "misses": self.cache_misses.load(Ordering::Relaxed),
            },
            "providers": providers,
        })
    }

    /// The full dashboard message: per-provider and per-endpoint views,
    /// system state, and the historical snapshot. Each call advances the
    /// broadcast sequence number.
    pub fn comprehensive(&self) -> Value {
        let now = Instant::now();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);

        let mut providers = Map::new();
        {
            let guard = self.providers.read().unwrap_or_else(|e| e.into_inner());
            for (name, stats) in guard.iter() {
                let stats = stats.lock().unwrap_or_else(|e| e.into_inner());
                providers.insert(name.clone(), stats.view(now));
            }
        }

        let mut endpoints = Map::new();
        {
            let guard = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
            for (path, stats) in guard.iter() {
                let stats = stats.lock().unwrap_or_else(|e| e.into_inner());
                endpoints.insert((*path).to_string(), stats.view(now));
            }
        }

        let historical = {
            let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            history.view()
        };

        json!({
            "timestamp": unix_millis(),
            "seq": seq,
            "update_type": "comprehensive_metrics",
            "providers": providers,
            "endpoints": endpoints,
            "system": self.system_view(now),
            "historical": historical,
            "recent_errors": self.recent_errors(),
        })
    }

    /// `/metrics/performance`: the per-endpoint latency profile, with the
    /// current worst offender called out.
    pub fn performance(&self) -> Value {
        let now = Instant::now();
        let mut endpoints = Map::new();
        let mut total_requests = 0u64;
        let mut slowest: Option<(String, u64)> = None;

        let guard = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        for (path, stats) in guard.iter() {
            let stats = stats.lock().unwrap_or_else(|e| e.into_inner());
            total_requests += stats.requests;
            let p99 = percentile(&stats.durations_ms, 0.99);
            if slowest.as_ref().map_or(true, |(_, worst)| p99 > *worst) {
                slowest = Some(((*path).to_string(), p99));
            }
            endpoints.insert((*path).to_string(), stats.view(now));
        }
        drop(guard);

        json!({
            "total_requests": total_requests,
            "total_rps": self.total_rps(now),
            "slowest_endpoint": slowest
                .map(|(endpoint, p99_ms)| json!({ "endpoint": endpoint, "p99_ms": p99_ms })),
            "endpoints": endpoints,
        })
    }

    /// `/metrics/history`: the rings alone.
    pub fn history(&self) -> Value {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.view()
    }

    /// `/metrics/provider/{name}`.
    pub fn provider_detail(&self, name: &str) -> Option<Value> {
        let guard = self.providers.read().unwrap_or_else(|e| e.into_inner());
        let stats = guard.get(name)?;
        let stats = stats.lock().unwrap_or_else(|e| e.into_inner());
        Some(stats.view(Instant::now()))
    }

    fn system_view(&self, now: Instant) -> Value {
        let (cpu_percent, memory_bytes, memory_percent) = {
            let sampler = self.system.lock().unwrap_or_else(|e| e.into_inner());
            (
                sampler.cpu_percent,
                sampler.memory_bytes,
                sampler.memory_percent,
            )
        };
        json!({
            "cpu_percent": cpu_percent,
            "memory_bytes": memory_bytes,
            "memory_percent": memory_percent,
            "uptime_s": self.uptime().as_secs(),
            "active_connections": self.active_connections.load(Ordering::Relaxed),
            "total_rps": self.total_rps(now),
        })
    }

    /// Fleet-wide (avg latency, success rate, requests-per-minute).
    fn fleet_rollup(&self, now: Instant) -> (f64, f64, f64) {
        let guard = self.providers.read().unwrap_or_else(|e| e.into_inner());
        let mut latency_sum = 0u64;
        let mut latency_count = 0usize;
        let mut requests = 0u64;
        let mut successes = 0u64;
        let mut rpm = 0f64;
        for stats in guard.values() {
            let stats = stats.lock().unwrap_or_else(|e| e.into_inner());
            latency_sum += stats.latencies_ms.iter().sum::<u64>();
            latency_count += stats.latencies_ms.len();
            requests += stats.requests;
            successes += stats.successes;
            rpm += count_within(&stats.events, now, Duration::from_secs(60)) as f64;
        }
        let avg = if latency_count > 0 {
            latency_sum as f64 / latency_count as f64
        } else {
            0.0
        };
        let success_rate = if requests > 0 {
            successes as f64 / requests as f64
        } else {
            1.0
        };
        (avg, success_rate, rpm)
    }

    fn total_rps(&self, now: Instant) -> u64 {
        let guard = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        guard
            .values()
            .map(|stats| {
                let stats = stats.lock().unwrap_or_else(|e| e.into_inner());
                count_within(&stats.events, now, Duration::from_secs(1))
            })
            .sum()
    }
}

impl MetricsAggregator {
    fn record_error(&self, record: &AttemptRecord, kind: ErrorKind) {
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        if errors.len() == ERROR_HISTORY {
            errors.pop_front();
        }
        errors.push_back(ErrorEvent {
            at_ms: unix_millis(),
            provider: record.provider.clone(),
            kind,
            detail: record.detail.clone(),
        });
    }

    /// The bounded ring of recent terminal errors, newest last.
    pub fn recent_errors(&self) -> Value {
        let errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        Value::Array(
            errors
                .iter()
                .map(|event| {
                    json!({
                        "timestamp": event.at_ms,
                        "provider": event.provider,
                        "kind": event.kind.as_str(),
                        "detail": event.detail,
                    })
                })
                .collect(),
        )
    }
}

impl Observer for MetricsAggregator {
    fn on_attempt(&self, record: &AttemptRecord) {
        if let Err(kind) = record.outcome {
            self.record_error(record, kind);
        }
        let now = Instant::now();
        {
            let guard = self.providers.read().unwrap_or_else(|e| e.into_inner());
            if let Some(stats) = guard.get(&record.provider) {
                stats
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record(record, now);
                return;
            }
        }
        // First sighting of this provider.
        let mut guard = self.providers.write().unwrap_or_else(|e| e.into_inner());
        guard
            .entry(record.provider.clone())
            .or_insert_with(|| Mutex::new(ProviderStats::default()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(record, now);
    }

    fn on_request(&self, record: &RequestRecord) {
        let now = Instant::now();
        {
            let guard = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
            if let Some(stats) = guard.get(record.endpoint) {
                stats
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record(record, now);
                return;
            }
        }
        let mut guard = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        guard
            .entry(record.endpoint)
            .or_insert_with(|| Mutex::new(EndpointStats::default()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(record, now);
    }

    fn on_cache(&self, outcome: CacheOutcome) {
        match outcome {
            CacheOutcome::Hit => self.cache_hits.fetch_add(1, Ordering::Relaxed),
            CacheOutcome::Miss => self.cache_misses.fetch_add(1, Ordering::Relaxed),
        };
    }
}

fn push_bounded(window: &mut VecDeque<u64>, value: u64) {
    if window.len() == LATENCY_WINDOW {
        window.pop_front();
    }
    window.push_back(value);
}

fn push_event(events: &mut VecDeque<(Instant, f64)>, event: (Instant, f64), now: Instant) {
    while let Some((at, _)) = events.front() {
        if now.duration_since(*at) > HOUR || events.len() >= EVENT_WINDOW {
            events.pop_front();
        } else {
            break;
        }
    }
    events.push_back(event);
}

fn count_within(events: &VecDeque<(Instant, f64)>, now: Instant, window: Duration) -> u64 {
    events
        .iter()
        .rev()
        .take_while(|(at, _)| now.duration_since(*at) <= window)
        .count() as u64
}

fn cost_within(events: &VecDeque<(Instant, f64)>, now: Instant, window: Duration) -> f64 {
    events
        .iter()
        .rev()
        .take_while(|(at, _)| now.duration_since(*at) <= window)
        .map(|(_, cost)| cost)
        .sum()
}

fn mean(window: &VecDeque<u64>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().sum::<u64>() as f64 / window.len() as f64
}

fn percentile(window: &VecDeque<u64>, q: f64) -> u64 {
    if window.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = window.iter().copied().collect();
    sorted.sort_unstable();
    let rank = ((sorted.len() as f64 - 1.0) * q).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
