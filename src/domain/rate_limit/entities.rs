use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::domain::auth::AuthError;

/// Quota for one protected surface: `requests` per `window`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RateLimitPolicy {
  pub requests: u32,
  #[serde(with = "window_seconds", rename = "window_seconds")]
  pub window: Duration,
}

impl RateLimitPolicy {
  pub fn new(requests: u32, window: Duration) -> Self {
    Self { requests, window }
  }

  /// Burst size equals the quota
  pub fn capacity(&self) -> f64 {
    f64::from(self.requests)
  }

  pub fn refill_rate_per_second(&self) -> f64 {
    let window = self.window.as_secs_f64();
    if window <= 0.0 {
      return f64::INFINITY;
    }
    f64::from(self.requests) / window
  }
}

mod window_seconds {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer};

  pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
  where
    D: Deserializer<'de>,
  {
    u64::deserialize(deserializer).map(Duration::from_secs)
  }
}

/// Token bucket for one key
#[derive(Debug, Clone)]
pub struct RateLimiterState {
  pub key: String,
  pub available_tokens: f64,
  pub last_refill_at: Instant,
  pub capacity: f64,
  pub refill_rate_per_second: f64,
}

/// Result of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
  pub allowed: bool,
  pub limit: u32,
  /// Whole tokens left after this check
  pub remaining: u32,
  /// Unix seconds at which the bucket will be full again
  pub reset_at: i64,
  /// Seconds until one token is available, set only on rejection
  pub retry_after: Option<u64>,
}

impl RateLimitDecision {
  /// `Ok` when allowed, otherwise the `RateLimited` error carrying the same numbers
  pub fn into_result(self) -> Result<Self, AuthError> {
    if self.allowed {
      return Ok(self);
    }
    Err(AuthError::RateLimited {
      limit: self.limit,
      remaining: self.remaining,
      reset_at: self.reset_at,
      retry_after: self.retry_after.unwrap_or(1),
    })
  }
}

impl RateLimiterState {
  /// A fresh bucket starts full
  pub fn new(key: impl Into<String>, policy: &RateLimitPolicy, now: Instant) -> Self {
    Self {
      key: key.into(),
      available_tokens: policy.capacity(),
      last_refill_at: now,
      capacity: policy.capacity(),
      refill_rate_per_second: policy.refill_rate_per_second(),
    }
  }

  fn refill(&mut self, now: Instant) {
    let elapsed = now.saturating_duration_since(self.last_refill_at).as_secs_f64();
    self.available_tokens =
      (self.available_tokens + elapsed * self.refill_rate_per_second).min(self.capacity);
    if now > self.last_refill_at {
      self.last_refill_at = now;
    }
  }

  /// Takes one token if one is available right now. Never waits; a rejected
  /// check consumes nothing and reports how long until a token exists.
  pub fn try_acquire(&mut self, now: Instant) -> RateLimitDecision {
    self.refill(now);

    let limit = self.capacity as u32;

    if self.available_tokens >= 1.0 {
      self.available_tokens -= 1.0;
      return RateLimitDecision {
        allowed: true,
        limit,
        remaining: self.available_tokens.floor() as u32,
        reset_at: self.reset_at(),
        retry_after: None,
      };
    }

    let wait = self.seconds_until(1.0);
    RateLimitDecision {
      allowed: false,
      limit,
      remaining: 0,
      reset_at: self.reset_at(),
      retry_after: Some((wait.ceil() as u64).max(1)),
    }
  }

  fn seconds_until(&self, tokens: f64) -> f64 {
    let missing = (tokens - self.available_tokens).max(0.0);
    if missing == 0.0 || !self.refill_rate_per_second.is_finite() {
      return 0.0;
    }
    if self.refill_rate_per_second <= 0.0 {
      return f64::MAX;
    }
    missing / self.refill_rate_per_second
  }

  fn reset_at(&self) -> i64 {
    let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs_f64();
    let full_in = self.seconds_until(self.capacity).min(i64::MAX as f64 / 2.0);
    (now + full_in).ceil() as i64
  }
}
