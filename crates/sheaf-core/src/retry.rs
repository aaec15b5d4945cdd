//! Retry and backoff policy shared by every outbound HTTP call.
//!
//! Both the upstream provider client and the key-value store client drive
//! their retry loops from a [`RetryPolicy`] value instead of carrying their
//! own constants.
//!
//! ```text
//! delay(attempt) = min(base × 2^attempt, max_delay) + U(0, jitter)
//! ```
//!
//! A server-provided `Retry-After` hint replaces the exponential term (still
//! capped at `max_delay`).

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How a single HTTP status should be treated by a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx.
    Success,
    /// 429 Too Many Requests.
    RateLimited,
    /// 5xx.
    Transient,
    /// Any other status. Never retried.
    Permanent,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            429 => StatusClass::RateLimited,
            500..=599 => StatusClass::Transient,
            _ => StatusClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusClass::RateLimited | StatusClass::Transient)
    }
}

/// Retry ceiling and backoff shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `max_retries = 4` means up to five requests.
    pub max_retries: u32,
    /// Base of the exponential term, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Upper bound of the uniform random jitter added to each delay, in milliseconds.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps. Used by tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ms: 0,
        }
    }

    /// Total number of requests this policy allows for one call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns true if another attempt is allowed after `attempt` (0-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Exponential component for a 0-based attempt, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(30));
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Delay to sleep before retrying after the 0-based `attempt` failed.
    ///
    /// `retry_after` is a server hint, already parsed; it overrides the
    /// exponential term but not the cap.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_delay()),
            None => self.backoff(attempt) + self.jitter(),
        }
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=self.jitter_ms))
    }
}

/// Parses a `Retry-After` header value.
///
/// Accepts delta-seconds (`"120"`) or an HTTP-date
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). Dates in the past yield zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
