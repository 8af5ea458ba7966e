use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use super::errors::{AuthError, StoreError};
use super::ports::TtlStore;
use super::retry::retry_once;
use super::value_objects::Deadline;

const ATTEMPTS_PREFIX: &str = "lockout:attempts";
const LOCKED_PREFIX: &str = "lockout:locked";

#[derive(Debug, Clone)]
pub struct LockoutConfig {
  /// Failures within `window` that trigger a lock
  pub max_attempts: u32,
  /// Lifetime of the failure counter, starting at the first failure
  pub window: Duration,
  pub lockout_duration: Duration,
  pub retry_backoff: Duration,
}

impl Default for LockoutConfig {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      window: Duration::from_secs(15 * 60),
      lockout_duration: Duration::from_secs(15 * 60),
      retry_backoff: Duration::from_millis(50),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockStatus {
  pub locked: bool,
  /// Residual lock time, zero when not locked
  pub remaining: Duration,
}

impl LockStatus {
  pub fn unlocked() -> Self {
    Self {
      locked: false,
      remaining: Duration::ZERO,
    }
  }

  pub fn locked_for(remaining: Duration) -> Self {
    Self {
      locked: true,
      remaining,
    }
  }
}

/// Failed-login counter and lock flag per identifier
///
/// All state lives in the TTL store, which owns expiry. Without a store, or
/// when the store fails, the tracker reports "not locked" and a full attempt
/// budget. Deadline expiry and cancellation are still reported as errors.
pub struct LockoutTracker {
  store: Option<Arc<dyn TtlStore>>,
  config: LockoutConfig,
}

impl LockoutTracker {
  pub fn new(store: Arc<dyn TtlStore>, config: LockoutConfig) -> Self {
    Self {
      store: Some(store),
      config,
    }
  }

  /// Tracker with no backing store; never locks anyone out
  pub fn disabled(config: LockoutConfig) -> Self {
    tracing::warn!("Lockout tracker running without a store, account lockout is disabled");
    Self {
      store: None,
      config,
    }
  }

  /// Counts one failed attempt and locks the identifier once the threshold
  /// is reached. Failures past the threshold restart the lock.
  pub async fn record_failure(
    &self,
    identifier: &str,
    deadline: &Deadline,
  ) -> Result<LockStatus, AuthError> {
    let Some(store) = &self.store else {
      return Ok(LockStatus::unlocked());
    };

    let attempts_key = attempts_key(identifier);
    let key = attempts_key.as_str();
    let window = self.config.window;

    let outcome = deadline
      .run(retry_once(
        self.config.retry_backoff,
        "lockout.increment",
        move || store.increment(key, window),
      ))
      .await?;

    let count = match outcome {
      Ok(count) => count,
      Err(error) => return Ok(self.fail_open("record_failure", error, LockStatus::unlocked())),
    };

    if count < i64::from(self.config.max_attempts) {
      tracing::debug!(failures = count, "Recorded failed login attempt");
      return Ok(LockStatus::unlocked());
    }

    let locked_key = locked_key(identifier);
    let key = locked_key.as_str();
    let duration = self.config.lockout_duration;

    let outcome = deadline
      .run(retry_once(
        self.config.retry_backoff,
        "lockout.set",
        move || store.set(key, "1", duration),
      ))
      .await?;

    match outcome {
      Ok(()) => {
        tracing::warn!(
          failures = count,
          lockout_seconds = duration.as_secs(),
          "Account locked after repeated failed logins"
        );
        Ok(LockStatus::locked_for(duration))
      }
      Err(error) => Ok(self.fail_open("record_failure", error, LockStatus::unlocked())),
    }
  }

  /// Remaining lock time comes from the lock flag's residual TTL
  pub async fn is_locked(
    &self,
    identifier: &str,
    deadline: &Deadline,
  ) -> Result<LockStatus, AuthError> {
    let Some(store) = &self.store else {
      return Ok(LockStatus::unlocked());
    };

    let locked_key = locked_key(identifier);
    let key = locked_key.as_str();

    let outcome = deadline
      .run(retry_once(
        self.config.retry_backoff,
        "lockout.ttl",
        move || store.ttl(key),
      ))
      .await?;

    match outcome {
      Ok(Some(remaining)) if !remaining.is_zero() => Ok(LockStatus::locked_for(remaining)),
      Ok(_) => Ok(LockStatus::unlocked()),
      Err(error) => Ok(self.fail_open("is_locked", error, LockStatus::unlocked())),
    }
  }

  /// Clears both the failure counter and the lock flag
  pub async fn reset_on_success(&self, identifier: &str, deadline: &Deadline) -> Result<(), AuthError> {
    let Some(store) = &self.store else {
      return Ok(());
    };

    let attempts_key = attempts_key(identifier);
    let locked_key = locked_key(identifier);
    let keys = [attempts_key.as_str(), locked_key.as_str()];
    let keys = &keys[..];

    let outcome = deadline
      .run(retry_once(
        self.config.retry_backoff,
        "lockout.delete",
        move || store.delete(keys),
      ))
      .await?;

    if let Err(error) = outcome {
      self.fail_open("reset_on_success", error, ());
    }
    Ok(())
  }

  /// Threshold minus current failures, floored at zero
  pub async fn remaining_attempts(
    &self,
    identifier: &str,
    deadline: &Deadline,
  ) -> Result<u32, AuthError> {
    let max = self.config.max_attempts;
    let Some(store) = &self.store else {
      return Ok(max);
    };

    let attempts_key = attempts_key(identifier);
    match self.read_counter(store, &attempts_key, deadline).await? {
      Ok(count) => Ok(max.saturating_sub(count)),
      Err(error) => Ok(self.fail_open("remaining_attempts", error, max)),
    }
  }

  async fn read_counter(
    &self,
    store: &Arc<dyn TtlStore>,
    key: &str,
    deadline: &Deadline,
  ) -> Result<Result<u32, StoreError>, AuthError> {
    let outcome = deadline
      .run(retry_once(
        self.config.retry_backoff,
        "lockout.get",
        move || store.get(key),
      ))
      .await?;

    Ok(outcome.and_then(|value| match value {
      None => Ok(0),
      Some(raw) => raw
        .parse::<u32>()
        .map_err(|_| StoreError::InvalidValue {
          key: key.to_string(),
        }),
    }))
  }

  fn fail_open<T>(&self, operation: &'static str, error: StoreError, fallback: T) -> T {
    tracing::warn!(
      operation,
      error = %error,
      "Lockout store unavailable, failing open"
    );
    fallback
  }
}

fn normalize(identifier: &str) -> String {
  identifier.trim().to_lowercase()
}

/// Keys carry a digest of the identifier so raw emails never reach the store
fn key_for(prefix: &str, identifier: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(normalize(identifier).as_bytes());
  format!("{}:{}", prefix, hex::encode(hasher.finalize()))
}

fn attempts_key(identifier: &str) -> String {
  key_for(ATTEMPTS_PREFIX, identifier)
}

fn locked_key(identifier: &str) -> String {
  key_for(LOCKED_PREFIX, identifier)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::infrastructure::cache::MemoryTtlStore;
  use async_trait::async_trait;

  const EMAIL: &str = "a@b.com";

  fn config() -> LockoutConfig {
    LockoutConfig {
      max_attempts: 5,
      window: Duration::from_secs(60),
      lockout_duration: Duration::from_secs(300),
      retry_backoff: Duration::from_millis(10),
    }
  }

  fn tracker() -> (LockoutTracker, Arc<MemoryTtlStore>) {
    let store = Arc::new(MemoryTtlStore::new());
    (LockoutTracker::new(store.clone(), config()), store)
  }

  struct UnreachableStore;

  #[async_trait]
  impl TtlStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
      Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
      Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn increment(&self, _key: &str, _ttl: Duration) -> Result<i64, StoreError> {
      Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
      Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
      Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _keys: &[&str]) -> Result<(), StoreError> {
      Err(StoreError::Unavailable("connection refused".to_string()))
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_five_failures_lock_the_account() {
    let (tracker, _) = tracker();
    let deadline = Deadline::none();

    for attempt in 1..=4 {
      let status = tracker.record_failure(EMAIL, &deadline).await.unwrap();
      assert!(!status.locked, "locked after {} failures", attempt);
    }
    assert_eq!(tracker.remaining_attempts(EMAIL, &deadline).await.unwrap(), 1);

    let status = tracker.record_failure(EMAIL, &deadline).await.unwrap();
    assert!(status.locked);

    let status = tracker.is_locked(EMAIL, &deadline).await.unwrap();
    assert!(status.locked);
    assert!(status.remaining > Duration::ZERO);
    assert!(status.remaining <= Duration::from_secs(300));
    assert_eq!(tracker.remaining_attempts(EMAIL, &deadline).await.unwrap(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reset_on_success_clears_lock() {
    let (tracker, _) = tracker();
    let deadline = Deadline::none();

    for _ in 0..5 {
      tracker.record_failure(EMAIL, &deadline).await.unwrap();
    }
    tracker.reset_on_success(EMAIL, &deadline).await.unwrap();

    assert!(!tracker.is_locked(EMAIL, &deadline).await.unwrap().locked);
    assert_eq!(tracker.remaining_attempts(EMAIL, &deadline).await.unwrap(), 5);
  }

  #[tokio::test(start_paused = true)]
  async fn test_lock_expires_after_lockout_duration() {
    let (tracker, _) = tracker();
    let deadline = Deadline::none();

    for _ in 0..5 {
      tracker.record_failure(EMAIL, &deadline).await.unwrap();
    }
    tokio::time::advance(Duration::from_secs(301)).await;

    assert!(!tracker.is_locked(EMAIL, &deadline).await.unwrap().locked);
  }

  #[tokio::test(start_paused = true)]
  async fn test_counter_expires_with_window() {
    let (tracker, _) = tracker();
    let deadline = Deadline::none();

    for _ in 0..3 {
      tracker.record_failure(EMAIL, &deadline).await.unwrap();
    }
    assert_eq!(tracker.remaining_attempts(EMAIL, &deadline).await.unwrap(), 2);

    tokio::time::advance(Duration::from_secs(61)).await;

    assert_eq!(tracker.remaining_attempts(EMAIL, &deadline).await.unwrap(), 5);
  }

  #[tokio::test(start_paused = true)]
  async fn test_identifiers_are_normalized_and_hashed() {
    let (tracker, store) = tracker();
    let deadline = Deadline::none();

    tracker.record_failure(" A@B.com ", &deadline).await.unwrap();

    assert_eq!(tracker.remaining_attempts(EMAIL, &deadline).await.unwrap(), 4);
    assert!(store.keys().iter().all(|key| !key.contains("a@b.com")));
  }

  #[tokio::test]
  async fn test_disabled_tracker_fails_open() {
    let tracker = LockoutTracker::disabled(config());
    let deadline = Deadline::none();

    for _ in 0..10 {
      assert!(!tracker.record_failure(EMAIL, &deadline).await.unwrap().locked);
    }
    assert!(!tracker.is_locked(EMAIL, &deadline).await.unwrap().locked);
    assert_eq!(tracker.remaining_attempts(EMAIL, &deadline).await.unwrap(), 5);
  }

  #[tokio::test(start_paused = true)]
  async fn test_unreachable_store_fails_open() {
    let tracker = LockoutTracker::new(Arc::new(UnreachableStore), config());
    let deadline = Deadline::none();

    assert!(!tracker.record_failure(EMAIL, &deadline).await.unwrap().locked);
    assert!(!tracker.is_locked(EMAIL, &deadline).await.unwrap().locked);
    assert_eq!(tracker.remaining_attempts(EMAIL, &deadline).await.unwrap(), 5);
    tracker.reset_on_success(EMAIL, &deadline).await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_deadline_is_reported() {
    let (tracker, _) = tracker();
    let deadline = Deadline::after(Duration::ZERO);

    let result = tracker.record_failure(EMAIL, &deadline).await;
    assert!(matches!(result, Err(AuthError::Timeout)));
  }
}
