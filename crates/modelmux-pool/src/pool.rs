//! Pool implementation.

use crate::error::PoolError;
use crate::events::{PoolEvent, RetireReason};
use modelmux_core::config::PoolConfig;
use modelmux_core::events::{EventListener, EventListeners};
#[cfg(feature = "metrics")]
use metrics::gauge;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// How long a fresh client waits for a TCP connect before failing.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A pooled upstream HTTP client, checked out by at most one caller at a
/// time.
#[derive(Debug)]
pub struct PoolEntry {
    id: u64,
    host: String,
    client: reqwest::Client,
    created_at: Instant,
    last_used_at: Instant,
    request_count: u64,
    healthy: bool,
}

impl PoolEntry {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }
}

/// Counters for the pool as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub in_flight: usize,
    pub created: u64,
    pub reused: u64,
    pub retired: u64,
}

struct Inner {
    idle: HashMap<String, VecDeque<PoolEntry>>,
    /// Idle plus checked out.
    total: usize,
    in_flight: usize,
    shutdown: bool,
    next_id: u64,
}

impl Inner {
    fn idle_count(&self) -> usize {
        self.idle.values().map(|q| q.len()).sum()
    }
}

/// Per-host pool of reusable upstream HTTP clients.
pub struct ConnectionPool {
    name: String,
    config: PoolConfig,
    inner: Mutex<Inner>,
    release_notify: Notify,
    created: AtomicU64,
    reused: AtomicU64,
    retired: AtomicU64,
    event_listeners: EventListeners<PoolEvent>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_name("connection-pool", config)
    }

    pub fn with_name(name: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                idle: HashMap::new(),
                total: 0,
                in_flight: 0,
                shutdown: false,
                next_id: 0,
            }),
            release_notify: Notify::new(),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            retired: AtomicU64::new(0),
            event_listeners: EventListeners::new(),
        }
    }

    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: EventListener<PoolEvent> + 'static,
    {
        self.event_listeners.add(listener);
    }

    /// Returns a ready entry bound to `host`.
    ///
    /// A free entry is reused; below cap a new one is created; otherwise
    /// the caller blocks until any entry is released or `deadline`
    /// elapses.
    pub async fn acquire(&self, host: &str, deadline: Instant) -> Result<PoolEntry, PoolError> {
        let mut waited = false;
        loop {
            // Arm the notification before inspecting state so a release
            // between the check and the wait is not lost.
            let notified = self.release_notify.notified();

            let mut events = Vec::new();
            let outcome = {
                let mut guard = self.lock();
                let inner = &mut *guard;
                if inner.shutdown {
                    return Err(PoolError::ShutDown);
                }

                let now = Instant::now();
                let mut reusable = None;
                while let Some(mut entry) =
                    inner.idle.get_mut(host).and_then(|queue| queue.pop_front())
                {
                    if let Some(reason) = self.stale_reason(&entry, now) {
                        inner.total -= 1;
                        self.retired.fetch_add(1, Ordering::Relaxed);
                        events.push(PoolEvent::EntryRetired {
                            pool_name: self.name.clone(),
                            timestamp: now,
                            host: host.to_string(),
                            reason,
                        });
                        continue;
                    }
                    entry.last_used_at = now;
                    entry.request_count += 1;
                    inner.in_flight += 1;
                    reusable = Some(entry);
                    break;
                }

                if let Some(entry) = reusable {
                    self.reused.fetch_add(1, Ordering::Relaxed);
                    Some(Ok(entry))
                } else if inner.total < self.config.max_connections {
                    inner.total += 1;
                    inner.in_flight += 1;
                    inner.next_id += 1;
                    let id = inner.next_id;
                    match self.build_entry(id, host, now) {
                        Ok(entry) => {
                            self.created.fetch_add(1, Ordering::Relaxed);
                            events.push(PoolEvent::EntryCreated {
                                pool_name: self.name.clone(),
                                timestamp: now,
                                host: host.to_string(),
                            });
                            Some(Ok(entry))
                        }
                        Err(error) => {
                            inner.total -= 1;
                            inner.in_flight -= 1;
                            Some(Err(error))
                        }
                    }
                } else {
                    None
                }
            };

            for event in events.drain(..) {
                self.event_listeners.emit(&event);
            }

            match outcome {
                Some(result) => {
                    self.update_gauges();
                    return result;
                }
                None => {
                    if !waited {
                        waited = true;
                        self.event_listeners.emit(&PoolEvent::Exhausted {
                            pool_name: self.name.clone(),
                            timestamp: Instant::now(),
                            host: host.to_string(),
                        });
                    }
                    let deadline = tokio::time::Instant::from_std(deadline);
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(PoolError::AcquireTimeout);
                    }
                }
            }
        }
    }

    /// Returns an entry to the pool.
    ///
    /// The entry is retired instead of pooled when the call failed, the
    /// pool is shutting down, or the entry exceeds an age or usage cap.
    pub fn release(&self, mut entry: PoolEntry, ok: bool) {
        let now = Instant::now();
        entry.last_used_at = now;
        entry.healthy = entry.healthy && ok;

        let reason = if !entry.healthy {
            Some(RetireReason::Failed)
        } else {
            self.stale_reason(&entry, now)
        };

        let mut event = None;
        {
            let mut inner = self.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);

            let reason = if inner.shutdown {
                Some(RetireReason::Shutdown)
            } else {
                reason
            };

            match reason {
                Some(reason) => {
                    inner.total = inner.total.saturating_sub(1);
                    self.retired.fetch_add(1, Ordering::Relaxed);
                    event = Some(PoolEvent::EntryRetired {
                        pool_name: self.name.clone(),
                        timestamp: now,
                        host: entry.host.clone(),
                        reason,
                    });
                }
                None => {
                    inner
                        .idle
                        .entry(entry.host.clone())
                        .or_default()
                        .push_front(entry);
                }
            }
        }

        if let Some(event) = event {
            self.event_listeners.emit(&event);
        }
        // Whether pooled or retired, capacity was freed either way.
        self.release_notify.notify_one();
        self.update_gauges();
    }

    /// Retires idle entries past the idle timeout or age cap. Invoked
    /// periodically from a supervised worker.
    pub fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let mut events = Vec::new();
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if inner.shutdown {
                return 0;
            }
            for (host, queue) in inner.idle.iter_mut() {
                let before = queue.len();
                queue.retain(|entry| {
                    match self.idle_stale_reason(entry, now) {
                        Some(reason) => {
                            events.push(PoolEvent::EntryRetired {
                                pool_name: self.name.clone(),
                                timestamp: now,
                                host: host.clone(),
                                reason,
                            });
                            false
                        }
                        None => true,
                    }
                });
                inner.total -= before - queue.len();
            }
            inner.idle.retain(|_, queue| !queue.is_empty());
        }

        let reaped = events.len();
        self.retired.fetch_add(reaped as u64, Ordering::Relaxed);
        for event in events {
            self.event_listeners.emit(&event);
        }
        if reaped > 0 {
            tracing::debug!(pool = %self.name, reaped, "idle entries retired");
            self.release_notify.notify_waiters();
            self.update_gauges();
        }
        reaped
    }

    /// Refuses new acquisitions and retires every idle entry. Checked-out
    /// entries are retired as they are released.
    pub fn shutdown(&self) {
        let mut events = Vec::new();
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.shutdown = true;
            let now = Instant::now();
            for (host, queue) in inner.idle.drain() {
                for _ in 0..queue.len() {
                    events.push(PoolEvent::EntryRetired {
                        pool_name: self.name.clone(),
                        timestamp: now,
                        host: host.clone(),
                        reason: RetireReason::Shutdown,
                    });
                }
                inner.total -= queue.len();
            }
        }
        self.retired.fetch_add(events.len() as u64, Ordering::Relaxed);
        for event in events {
            self.event_listeners.emit(&event);
        }
        // Wake all blocked acquirers so they observe the shutdown.
        self.release_notify.notify_waiters();
        tracing::info!(pool = %self.name, "pool shut down");
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            total: inner.total,
            idle: inner.idle_count(),
            in_flight: inner.in_flight,
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            retired: self.retired.load(Ordering::Relaxed),
        }
    }

    /// Entries currently checked out.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    fn build_entry(&self, id: u64, host: &str, now: Instant) -> Result<PoolEntry, PoolError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(1)
            .build()?;
        Ok(PoolEntry {
            id,
            host: host.to_string(),
            client,
            created_at: now,
            last_used_at: now,
            request_count: 1,
            healthy: true,
        })
    }

    /// Cap checks applied when an entry changes hands.
    fn stale_reason(&self, entry: &PoolEntry, now: Instant) -> Option<RetireReason> {
        if now.duration_since(entry.created_at) > self.config.max_age() {
            Some(RetireReason::MaxAge)
        } else if entry.request_count >= self.config.max_requests_per_entry {
            Some(RetireReason::MaxRequests)
        } else {
            None
        }
    }

    /// Cap checks applied to entries sitting idle.
    fn idle_stale_reason(&self, entry: &PoolEntry, now: Instant) -> Option<RetireReason> {
        if now.duration_since(entry.last_used_at) > self.config.idle_timeout() {
            Some(RetireReason::IdleTimeout)
        } else {
            self.stale_reason(entry, now)
        }
    }

    fn update_gauges(&self) {
        #[cfg(feature = "metrics")]
        {
            let stats = self.stats();
            gauge!("pool_total_entries", "pool" => self.name.clone()).set(stats.total as f64);
            gauge!("pool_in_flight", "pool" => self.name.clone()).set(stats.in_flight as f64);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
