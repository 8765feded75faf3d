//! Rate-limit headroom tracking.

use reqwest::header::HeaderMap;
use std::time::{Duration, Instant};

/// Last observed rate-limit headroom for one provider, self-reported via
/// response headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateStatus {
    /// Requests remaining in the current window; `None` until the vendor
    /// reports one.
    pub remaining: Option<u64>,
    /// When the window resets; `None` when unknown.
    pub reset_at: Option<Instant>,
}

impl RateStatus {
    /// Whether a request may be sent: headroom remains, the window has
    /// reset, or the vendor never told us.
    pub fn has_headroom(&self, now: Instant) -> bool {
        match self.remaining {
            Some(0) => match self.reset_at {
                Some(reset_at) => now >= reset_at,
                // Exhausted with no reset hint: stay pessimistic until the
                // next response updates us.
                None => false,
            },
            _ => true,
        }
    }

    /// Folds response headers into the status. Returns true if anything
    /// was learned.
    pub fn observe(&mut self, headers: &HeaderMap, now: Instant) -> bool {
        let mut learned = false;

        for name in ["x-ratelimit-remaining-requests", "x-ratelimit-remaining"] {
            if let Some(remaining) = header_u64(headers, name) {
                self.remaining = Some(remaining);
                learned = true;
                break;
            }
        }

        let reset = header_duration(headers, "retry-after")
            .or_else(|| header_duration(headers, "x-ratelimit-reset-requests"))
            .or_else(|| header_duration(headers, "x-ratelimit-reset"));
        if let Some(reset) = reset {
            self.reset_at = Some(now + reset);
            learned = true;
        }

        learned
    }

    /// Records an explicit retry-after hint (e.g. from a 429 body).
    pub fn exhausted_for(&mut self, wait: Duration, now: Instant) {
        self.remaining = Some(0);
        self.reset_at = Some(now + wait);
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Parses duration-ish header values: `7`, `0.5`, `250ms`, `6s`, `1m`.
fn header_duration(headers: &HeaderMap, name: &str) -> Option<Duration> {
    let raw = headers.get(name)?.to_str().ok()?.trim();
    let (digits, unit): (&str, &str) = match raw.find(|c: char| c.is_ascii_alphabetic()) {
        Some(split) => (&raw[..split], &raw[split..]),
        None => (raw, "s"),
    };
    let value: f64 = digits.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let seconds = match unit {
        "ms" => value / 1_000.0,
        "m" => value * 60.0,
        _ => value,
    };
    Some(Duration::from_secs_f64(seconds))
}
