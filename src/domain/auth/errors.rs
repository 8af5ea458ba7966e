use std::time::Duration;

use thiserror::Error;

use super::value_objects::{Interrupted, ValueObjectError};

/// Main authentication error type
///
/// Security-relevant kinds (`TokenReuseDetected`, `TokenOwnershipMismatch`,
/// `TokenRevoked`) are returned only after their side effects were committed
/// and are never retried.
#[derive(Debug, Error)]
pub enum AuthError {
  #[error("Invalid credentials provided")]
  InvalidCredentials,

  #[error("Invalid token")]
  InvalidToken,

  #[error("Token expired")]
  ExpiredToken,

  #[error("Refresh token reuse detected, all sessions in the family were revoked")]
  TokenReuseDetected,

  #[error("Refresh token has been revoked")]
  TokenRevoked,

  #[error("Refresh token belongs to a different user")]
  TokenOwnershipMismatch,

  #[error("Account temporarily locked, retry in {} seconds", remaining.as_secs())]
  AccountLocked { remaining: Duration },

  #[error("Rate limit exceeded, retry in {retry_after} seconds")]
  RateLimited {
    limit: u32,
    remaining: u32,
    reset_at: i64,
    retry_after: u64,
  },

  #[error("Authentication store unavailable")]
  StoreUnavailable,

  #[error("Operation deadline exceeded")]
  Timeout,

  #[error("Operation cancelled by caller")]
  Cancelled,

  #[error("Access token error: {0}")]
  Signing(String),

  #[error("Hash error: {0}")]
  Hash(#[from] HashError),

  #[error("Value object error: {0}")]
  ValueObject(#[from] ValueObjectError),
}

impl From<Interrupted> for AuthError {
  fn from(interrupted: Interrupted) -> Self {
    match interrupted {
      Interrupted::TimedOut => AuthError::Timeout,
      Interrupted::Cancelled => AuthError::Cancelled,
    }
  }
}

/// Storage details never cross the service boundary; they are logged and
/// replaced by the opaque `StoreUnavailable`.
impl From<RepositoryError> for AuthError {
  fn from(error: RepositoryError) -> Self {
    tracing::error!(error = %error, "Token store operation failed");
    AuthError::StoreUnavailable
  }
}

/// Repository-related errors
#[derive(Debug, Error)]
pub enum RepositoryError {
  #[error("Database connection failed: {0}")]
  ConnectionFailed(String),

  #[error("Query execution failed: {0}")]
  QueryFailed(String),

  #[error("Transaction failed: {0}")]
  TransactionFailed(String),

  #[error("Record not found")]
  NotFound,

  #[error("Duplicate key violation: {0}")]
  DuplicateKey(String),

  #[error("Database error: {0}")]
  DatabaseError(String),
}

impl RepositoryError {
  /// Whether a single retry has a reasonable chance of succeeding
  pub fn is_transient(&self) -> bool {
    matches!(self, RepositoryError::ConnectionFailed(_))
  }
}

/// Errors raised by TTL key-value stores
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Store unavailable: {0}")]
  Unavailable(String),

  #[error("Store command failed: {0}")]
  Command(String),

  #[error("Unexpected value stored under {key}")]
  InvalidValue { key: String },
}

impl StoreError {
  pub fn is_transient(&self) -> bool {
    matches!(self, StoreError::Unavailable(_))
  }
}

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum HashError {
  #[error("Failed to hash password: {0}")]
  HashingFailed(String),

  #[error("Failed to verify password: {0}")]
  VerificationFailed(String),

  #[error("Invalid hash format")]
  InvalidFormat,
}

// Automatic conversions from external error types

impl From<sqlx::Error> for RepositoryError {
  fn from(error: sqlx::Error) -> Self {
    match error {
      sqlx::Error::RowNotFound => RepositoryError::NotFound,
      sqlx::Error::Database(db_err) => {
        if db_err.is_unique_violation() {
          RepositoryError::DuplicateKey(db_err.message().to_string())
        } else {
          RepositoryError::DatabaseError(db_err.message().to_string())
        }
      }
      sqlx::Error::PoolTimedOut => RepositoryError::ConnectionFailed("Pool timed out".to_string()),
      sqlx::Error::PoolClosed => RepositoryError::ConnectionFailed("Pool closed".to_string()),
      sqlx::Error::Io(e) => RepositoryError::ConnectionFailed(e.to_string()),
      _ => RepositoryError::QueryFailed(error.to_string()),
    }
  }
}

impl From<redis::RedisError> for StoreError {
  fn from(error: redis::RedisError) -> Self {
    if error.is_io_error()
      || error.is_connection_dropped()
      || error.is_connection_refusal()
      || error.is_timeout()
    {
      StoreError::Unavailable(error.to_string())
    } else {
      StoreError::Command(error.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_repository_error_is_opaque_to_callers() {
    let error: AuthError =
      RepositoryError::ConnectionFailed("tcp://db.internal:5432 refused".to_string()).into();

    assert!(matches!(error, AuthError::StoreUnavailable));
    assert!(!error.to_string().contains("db.internal"));
  }

  #[test]
  fn test_transient_classification() {
    assert!(RepositoryError::ConnectionFailed("x".to_string()).is_transient());
    assert!(!RepositoryError::TransactionFailed("x".to_string()).is_transient());
    assert!(!RepositoryError::DuplicateKey("x".to_string()).is_transient());
    assert!(StoreError::Unavailable("x".to_string()).is_transient());
    assert!(!StoreError::Command("x".to_string()).is_transient());
  }

  #[test]
  fn test_interrupted_conversion() {
    assert!(matches!(
      AuthError::from(Interrupted::TimedOut),
      AuthError::Timeout
    ));
    assert!(matches!(
      AuthError::from(Interrupted::Cancelled),
      AuthError::Cancelled
    ));
  }
}
