use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use super::errors::{RepositoryError, StoreError};

/// Errors that can tell whether trying again might help
pub trait Transient {
  fn is_transient(&self) -> bool;
}

impl Transient for RepositoryError {
  fn is_transient(&self) -> bool {
    RepositoryError::is_transient(self)
  }
}

impl Transient for StoreError {
  fn is_transient(&self) -> bool {
    StoreError::is_transient(self)
  }
}

/// Runs `operation`, and runs it exactly once more after `backoff` if the
/// first attempt failed with a transient error.
pub async fn retry_once<T, E, F, Fut>(
  backoff: Duration,
  operation_name: &'static str,
  mut operation: F,
) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: Transient + Display,
{
  match operation().await {
    Err(error) if error.is_transient() => {
      tracing::warn!(
        operation = operation_name,
        error = %error,
        backoff_ms = backoff.as_millis() as u64,
        "Transient store failure, retrying once"
      );
      tokio::time::sleep(backoff).await;
      operation().await
    }
    outcome => outcome,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[tokio::test(start_paused = true)]
  async fn test_retries_transient_failure_once() {
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let result: Result<u32, StoreError> =
      retry_once(Duration::from_millis(50), "test", move || async move {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
          Err(StoreError::Unavailable("down".to_string()))
        } else {
          Ok(call)
        }
      })
      .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_gives_up_after_second_failure() {
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let result: Result<(), RepositoryError> =
      retry_once(Duration::from_millis(50), "test", move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(RepositoryError::ConnectionFailed("down".to_string()))
      })
      .await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_permanent_failure_is_not_retried() {
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let result: Result<(), RepositoryError> = retry_once(Duration::ZERO, "test", move || async move {
      calls.fetch_add(1, Ordering::SeqCst);
      Err(RepositoryError::DuplicateKey("token_hash".to_string()))
    })
    .await;

    assert!(matches!(result, Err(RepositoryError::DuplicateKey(_))));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }
}
