//! Exponential backoff for rate-limited requests.

use crate::config::RateLimitConfig;
use rand::Rng;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::time::Duration;

/// What to do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    /// Rate limited, try again after a backoff
    Retry,
    /// Intentionally absent on the remote
    NotFound,
    /// Any other status, give up immediately
    Fail,
}

/// Classify a response status.
///
/// 429 is always retried. 403 is retried only when the quota is exhausted
/// (`X-RateLimit-Remaining: 0`); a plain 403 is a permission problem.
pub fn classify(status: StatusCode, headers: &HeaderMap) -> Disposition {
    if status.is_success() {
        return Disposition::Success;
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => Disposition::Retry,
        StatusCode::FORBIDDEN if quota_exhausted(headers) => Disposition::Retry,
        StatusCode::NOT_FOUND => Disposition::NotFound,
        _ => Disposition::Fail,
    }
}

fn quota_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_attempts: config.max_attempts.max(1),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Delay before retry number `retry`, with random jitter added.
    pub fn delay(&self, retry: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        self.base_delay(retry) + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
