//! Cache storage.

use crate::events::CacheEvent;
use lru::LruCache;
use modelmux_core::config::CacheConfig;
use modelmux_core::events::{EventListener, EventListeners};
use modelmux_core::{CanonicalResponse, Fingerprint};
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entries younger than this are never judged cold: their lifetime is too
/// short for a per-minute hit rate to mean anything.
const COLD_SCAN_MIN_AGE: Duration = Duration::from_secs(60);

/// Adaptive-TTL bounds and thresholds.
const MULTIPLIER_FLOOR: f64 = 0.5;
const MULTIPLIER_CEIL: f64 = 4.0;
const ADAPT_MIN_LOOKUPS: u64 = 50;
const ADAPT_HOT_RATE: f64 = 0.7;
const ADAPT_COLD_RATE: f64 = 0.3;

struct Entry {
    response: CanonicalResponse,
    inserted_at: Instant,
    ttl: Duration,
    hits: u64,
    size_bytes: usize,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }

    fn hits_per_minute(&self, now: Instant) -> f64 {
        let minutes = now.duration_since(self.inserted_at).as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return f64::INFINITY;
        }
        self.hits as f64 / minutes
    }
}

struct Inner {
    map: LruCache<Fingerprint, Entry>,
    bytes: usize,
}

/// Aggregate cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub bytes: usize,
    pub hit_rate: f64,
}

/// Result of one maintenance scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub expired: usize,
    pub cold: usize,
}

/// Content-addressed LRU + TTL store of prior upstream responses.
pub struct ResponseCache {
    name: String,
    inner: Mutex<Inner>,
    max_bytes: usize,
    default_ttl: Duration,
    max_ttl: Duration,
    hit_rate_threshold: f64,
    adaptive_ttl: bool,
    /// f64 bits; runtime-adjustable reaction to cache pressure.
    ttl_multiplier: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    event_listeners: EventListeners<CacheEvent>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_name("response-cache", config)
    }

    pub fn with_name(name: impl Into<String>, config: &CacheConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                map: LruCache::new(capacity),
                bytes: 0,
            }),
            max_bytes: config.max_bytes,
            default_ttl: config.default_ttl(),
            max_ttl: config.max_ttl(),
            hit_rate_threshold: config.hit_rate_threshold,
            adaptive_ttl: config.adaptive_ttl,
            ttl_multiplier: AtomicU64::new(1.0f64.to_bits()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            event_listeners: EventListeners::new(),
        }
    }

    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: EventListener<CacheEvent> + 'static,
    {
        self.event_listeners.add(listener);
    }

    /// Returns the cached response if present and not expired.
    ///
    /// A hit refreshes the LRU position and the entry's hit counter; an
    /// expired entry is removed on the spot and reported as a miss.
    pub fn get(&self, key: &Fingerprint) -> Option<CanonicalResponse> {
        enum Lookup {
            Hit(CanonicalResponse),
            Expired,
            Miss,
        }

        let now = Instant::now();
        let lookup = {
            let mut inner = self.lock();
            let lookup = match inner.map.get_mut(key) {
                Some(entry) if entry.is_expired(now) => Lookup::Expired,
                Some(entry) => {
                    entry.hits += 1;
                    Lookup::Hit(entry.response.clone())
                }
                None => Lookup::Miss,
            };
            if matches!(lookup, Lookup::Expired) {
                if let Some(entry) = inner.map.pop(key) {
                    inner.bytes = inner.bytes.saturating_sub(entry.size_bytes);
                }
            }
            lookup
        };

        match lookup {
            Lookup::Hit(response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                counter!("cache_hits_total", "cache" => self.name.clone()).increment(1);
                self.event_listeners.emit(&CacheEvent::Hit {
                    cache_name: self.name.clone(),
                    timestamp: now,
                });
                Some(response)
            }
            Lookup::Expired => {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.event_listeners.emit(&CacheEvent::Expired {
                    cache_name: self.name.clone(),
                    timestamp: now,
                });
                self.record_miss(now);
                None
            }
            Lookup::Miss => {
                self.record_miss(now);
                None
            }
        }
    }

    fn record_miss(&self, now: Instant) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!("cache_misses_total", "cache" => self.name.clone()).increment(1);
        self.event_listeners.emit(&CacheEvent::Miss {
            cache_name: self.name.clone(),
            timestamp: now,
        });
    }

    /// Inserts a response, evicting least-recently-used entries until both
    /// the entry cap and the byte cap admit it. An entry that alone
    /// exceeds the byte cap is not stored.
    pub fn put(&self, key: Fingerprint, response: CanonicalResponse, ttl: Option<Duration>) {
        let size_bytes = response.size_bytes();
        if size_bytes > self.max_bytes {
            tracing::debug!(
                cache = %self.name,
                size_bytes,
                max_bytes = self.max_bytes,
                "response larger than the byte cap; not cached"
            );
            return;
        }

        let ttl = self.effective_ttl(ttl);
        let mut evicted_sizes: Vec<usize> = Vec::new();

        {
            let mut inner = self.lock();

            // Replacing an existing entry releases its bytes first.
            if let Some(old) = inner.map.pop(&key) {
                inner.bytes = inner.bytes.saturating_sub(old.size_bytes);
            }

            while inner.bytes + size_bytes > self.max_bytes {
                let Some((_, old)) = inner.map.pop_lru() else {
                    break;
                };
                inner.bytes = inner.bytes.saturating_sub(old.size_bytes);
                evicted_sizes.push(old.size_bytes);
            }

            if let Some((_, old)) = inner.map.push(
                key,
                Entry {
                    response,
                    inserted_at: Instant::now(),
                    ttl,
                    hits: 0,
                    size_bytes,
                },
            ) {
                // Entry cap displaced the LRU entry.
                inner.bytes = inner.bytes.saturating_sub(old.size_bytes);
                evicted_sizes.push(old.size_bytes);
            }
            inner.bytes += size_bytes;

            #[cfg(feature = "metrics")]
            {
                gauge!("cache_entries", "cache" => self.name.clone()).set(inner.map.len() as f64);
                gauge!("cache_bytes", "cache" => self.name.clone()).set(inner.bytes as f64);
            }
        }

        if !evicted_sizes.is_empty() {
            self.evictions
                .fetch_add(evicted_sizes.len() as u64, Ordering::Relaxed);
            for size in evicted_sizes {
                self.emit_eviction(size);
            }
        }
    }

    /// Removes a single entry.
    pub fn invalidate(&self, key: &Fingerprint) {
        let mut inner = self.lock();
        if let Some(entry) = inner.map.pop(key) {
            inner.bytes = inner.bytes.saturating_sub(entry.size_bytes);
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.bytes = 0;
    }

    /// Removes all expired entries and any cold entry whose lifetime
    /// per-minute hit rate is below the configured threshold. Invoked
    /// periodically from a supervised worker.
    pub fn scan(&self) -> ScanReport {
        let now = Instant::now();
        let mut report = ScanReport::default();
        let mut doomed: Vec<(Fingerprint, bool)> = Vec::new();

        let mut inner = self.lock();
        for (key, entry) in inner.map.iter() {
            if entry.is_expired(now) {
                doomed.push((*key, true));
            } else if self.hit_rate_threshold > 0.0
                && now.duration_since(entry.inserted_at) >= COLD_SCAN_MIN_AGE
                && entry.hits_per_minute(now) < self.hit_rate_threshold
            {
                doomed.push((*key, false));
            }
        }

        let mut cold_sizes: Vec<usize> = Vec::new();
        for (key, expired) in &doomed {
            if let Some(entry) = inner.map.pop(key) {
                inner.bytes = inner.bytes.saturating_sub(entry.size_bytes);
                if *expired {
                    report.expired += 1;
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                } else {
                    report.cold += 1;
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    cold_sizes.push(entry.size_bytes);
                }
            }
        }
        drop(inner);

        for size in cold_sizes {
            self.emit_eviction(size);
        }

        if report.expired > 0 || report.cold > 0 {
            tracing::debug!(
                cache = %self.name,
                expired = report.expired,
                cold = report.cold,
                "cache scan removed entries"
            );
        }
        report
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let inner = self.lock();
            (inner.map.len(), inner.bytes)
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries,
            bytes,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    /// Adjusts the adaptive-TTL multiplier. Has no effect unless adaptive
    /// mode is configured; the max-TTL cap always wins.
    pub fn set_ttl_multiplier(&self, multiplier: f64) {
        let clamped = multiplier.clamp(MULTIPLIER_FLOOR, MULTIPLIER_CEIL);
        self.ttl_multiplier
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn ttl_multiplier(&self) -> f64 {
        f64::from_bits(self.ttl_multiplier.load(Ordering::Relaxed))
    }

    /// Reacts to cache pressure: a hot cache earns longer TTLs, a cold
    /// one decays back toward the configured default. Invoked by the
    /// scan worker; a no-op outside adaptive mode or before enough
    /// lookups have accumulated.
    pub fn adapt(&self) {
        if !self.adaptive_ttl {
            return;
        }
        let stats = self.stats();
        if stats.hits + stats.misses < ADAPT_MIN_LOOKUPS {
            return;
        }

        let current = self.ttl_multiplier();
        let next = if stats.hit_rate >= ADAPT_HOT_RATE {
            current * 1.25
        } else if stats.hit_rate <= ADAPT_COLD_RATE {
            current * 0.8
        } else {
            // Drift back toward neutral.
            current + (1.0 - current) * 0.25
        };
        let next = next.clamp(MULTIPLIER_FLOOR, MULTIPLIER_CEIL);

        if (next - current).abs() > f64::EPSILON {
            tracing::debug!(
                cache = %self.name,
                hit_rate = stats.hit_rate,
                multiplier = next,
                "adaptive ttl adjusted"
            );
            self.set_ttl_multiplier(next);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn effective_ttl(&self, requested: Option<Duration>) -> Duration {
        let mut ttl = requested.unwrap_or(self.default_ttl);
        if self.adaptive_ttl {
            let multiplier = f64::from_bits(self.ttl_multiplier.load(Ordering::Relaxed));
            ttl = ttl.mul_f64(multiplier);
        }
        ttl.min(self.max_ttl)
    }

    fn emit_eviction(&self, size_bytes: usize) {
        #[cfg(feature = "metrics")]
        counter!("cache_evictions_total", "cache" => self.name.clone()).increment(1);
        self.event_listeners.emit(&CacheEvent::Evicted {
            cache_name: self.name.clone(),
            timestamp: Instant::now(),
            size_bytes,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
