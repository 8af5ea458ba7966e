use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use parking_lot::Mutex;

use super::entities::{RateLimitDecision, RateLimitPolicy, RateLimiterState};

/// Per-key token-bucket admission control for one protected surface
///
/// Buckets live in a bounded cache with LRU eviction and an idle TTL. The
/// idle TTL is never shorter than the policy window, so an evicted bucket
/// would have been full anyway and re-creating it full loses nothing.
///
/// Checks never block on I/O and never sleep.
pub struct RateLimiter {
  surface: String,
  policy: RateLimitPolicy,
  buckets: Cache<String, Arc<Mutex<RateLimiterState>>>,
}

impl RateLimiter {
  pub fn new(
    surface: impl Into<String>,
    policy: RateLimitPolicy,
    max_keys: u64,
    idle_ttl: Duration,
  ) -> Self {
    let surface = surface.into();
    let idle_ttl = idle_ttl.max(policy.window);

    tracing::info!(
      surface = %surface,
      requests = policy.requests,
      window_seconds = policy.window.as_secs(),
      max_keys,
      idle_ttl_seconds = idle_ttl.as_secs(),
      "Rate limiter configured"
    );

    let buckets = Cache::builder()
      .max_capacity(max_keys)
      .time_to_idle(idle_ttl)
      .eviction_policy(EvictionPolicy::lru())
      .build();

    Self {
      surface,
      policy,
      buckets,
    }
  }

  pub fn surface(&self) -> &str {
    &self.surface
  }

  pub fn check(&self, key: &str) -> RateLimitDecision {
    self.check_at(key, Instant::now())
  }

  /// Admission check against an explicit clock reading
  pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
    let bucket = self.buckets.get_with_by_ref(key, || {
      Arc::new(Mutex::new(RateLimiterState::new(key, &self.policy, now)))
    });

    let decision = bucket.lock().try_acquire(now);

    if !decision.allowed {
      tracing::debug!(
        surface = %self.surface,
        retry_after = decision.retry_after.unwrap_or_default(),
        "Rate limit exceeded"
      );
    }

    decision
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn limiter(requests: u32, window_secs: u64) -> RateLimiter {
    RateLimiter::new(
      "test",
      RateLimitPolicy::new(requests, Duration::from_secs(window_secs)),
      1_000,
      Duration::from_secs(60),
    )
  }

  #[test]
  fn test_two_per_second() {
    let limiter = limiter(2, 1);
    let now = Instant::now();

    assert!(limiter.check_at("k", now).allowed);
    assert!(limiter.check_at("k", now + Duration::from_millis(100)).allowed);

    let third = limiter.check_at("k", now + Duration::from_millis(200));
    assert!(!third.allowed);
    assert!(third.retry_after.unwrap() > 0);

    assert!(limiter.check_at("k2", now + Duration::from_millis(200)).allowed);
  }

  #[test]
  fn test_five_per_second_reports_zero_remaining() {
    let limiter = limiter(5, 1);
    let now = Instant::now();

    for _ in 0..5 {
      assert!(limiter.check_at("k", now).allowed);
    }

    let sixth = limiter.check_at("k", now);
    assert!(!sixth.allowed);
    assert_eq!(sixth.remaining, 0);
    assert_eq!(sixth.limit, 5);
  }

  #[test]
  fn test_tokens_refill_over_time() {
    let limiter = limiter(2, 1);
    let now = Instant::now();

    limiter.check_at("k", now);
    limiter.check_at("k", now);
    assert!(!limiter.check_at("k", now).allowed);

    assert!(limiter.check_at("k", now + Duration::from_secs(1)).allowed);
  }

  #[test]
  fn test_reset_at_is_in_the_future() {
    let limiter = limiter(2, 10);
    let decision = limiter.check("k");
    let now = chrono::Utc::now().timestamp();

    assert!(decision.reset_at >= now);
    assert!(decision.reset_at <= now + 11);
  }

  #[test]
  fn test_keys_are_tracked_independently() {
    let limiter = limiter(1, 60);

    for key in ["a", "b", "c"] {
      assert!(limiter.check(key).allowed);
    }
    assert!(!limiter.check("a").allowed);
    assert!(!limiter.check("b").allowed);
    assert!(limiter.check("d").allowed);
  }

  #[test]
  fn test_concurrent_checks_never_overadmit() {
    let limiter = Arc::new(limiter(10, 3600));

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let limiter = Arc::clone(&limiter);
        std::thread::spawn(move || (0..5).filter(|_| limiter.check("shared").allowed).count())
      })
      .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 10);
  }
}
