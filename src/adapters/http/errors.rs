use actix_web::{
  HttpResponse, HttpResponseBuilder,
  error::ResponseError,
  http::{StatusCode, header::ContentType},
};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;

use crate::domain::auth::errors::AuthError;
use crate::domain::auth::services::LoginFailure;

use super::dtos::ErrorResponse;

/// API error type that maps domain errors to HTTP responses
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ApiError {
  /// Validation error (400 Bad Request)
  Validation(String),

  /// Authentication error (401, 403 or 429)
  Auth(AuthErrorKind),

  /// Backing store unreachable or request deadline exceeded (503)
  Unavailable,

  /// Internal server error (500 Internal Server Error)
  Internal(String),
}

/// Authentication error kinds
#[derive(Debug, Serialize)]
pub enum AuthErrorKind {
  /// Invalid credentials (401)
  InvalidCredentials { remaining_attempts: Option<u32> },

  /// Unknown, malformed or expired token (401)
  InvalidToken,

  /// Token was revoked by logout (401)
  TokenRevoked,

  /// Refresh token replayed; the whole family is revoked (403)
  TokenReuseDetected,

  /// Token belongs to another user (403)
  TokenOwnershipMismatch,

  /// Too many failed logins (429)
  AccountLocked { remaining_seconds: u64 },

  /// Admission control rejected the request (429)
  RateLimited {
    limit: u32,
    remaining: u32,
    reset_at: i64,
    retry_after: u64,
  },
}

impl fmt::Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ApiError::Validation(msg) => write!(f, "Validation error: {}", msg),
      ApiError::Auth(kind) => write!(f, "Authentication error: {:?}", kind),
      ApiError::Unavailable => write!(f, "Service temporarily unavailable"),
      ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
    }
  }
}

/// Whole seconds, rounded up, never zero
fn ceil_seconds(duration: Duration) -> u64 {
  let seconds = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
  seconds.max(1)
}

/// `X-RateLimit-*` headers, also attached to admitted responses
pub fn rate_limit_headers(
  builder: &mut HttpResponseBuilder,
  limit: u32,
  remaining: u32,
  reset_at: i64,
) {
  builder
    .insert_header(("X-RateLimit-Limit", limit.to_string()))
    .insert_header(("X-RateLimit-Remaining", remaining.to_string()))
    .insert_header(("X-RateLimit-Reset", reset_at.to_string()));
}

impl ResponseError for ApiError {
  fn status_code(&self) -> StatusCode {
    match self {
      ApiError::Validation(_) => StatusCode::BAD_REQUEST,
      ApiError::Auth(kind) => match kind {
        AuthErrorKind::InvalidCredentials { .. } => StatusCode::UNAUTHORIZED,
        AuthErrorKind::InvalidToken => StatusCode::UNAUTHORIZED,
        AuthErrorKind::TokenRevoked => StatusCode::UNAUTHORIZED,
        AuthErrorKind::TokenReuseDetected => StatusCode::FORBIDDEN,
        AuthErrorKind::TokenOwnershipMismatch => StatusCode::FORBIDDEN,
        AuthErrorKind::AccountLocked { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthErrorKind::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
      },
      ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    let mut builder = HttpResponse::build(status);

    let (error_type, message, details) = match self {
      ApiError::Validation(msg) => ("validation_error", msg.clone(), None),
      ApiError::Auth(kind) => match kind {
        AuthErrorKind::InvalidCredentials { remaining_attempts } => (
          "invalid_credentials",
          "Invalid email or password".to_string(),
          remaining_attempts.map(|remaining| json!({ "remaining_attempts": remaining })),
        ),
        AuthErrorKind::InvalidToken => (
          "invalid_token",
          "Invalid or expired token".to_string(),
          None,
        ),
        AuthErrorKind::TokenRevoked => (
          "token_revoked",
          "Token has been revoked".to_string(),
          None,
        ),
        AuthErrorKind::TokenReuseDetected => (
          "token_reuse_detected",
          "Refresh token reuse detected. This session was force-revoked on every device, please sign in again"
            .to_string(),
          None,
        ),
        AuthErrorKind::TokenOwnershipMismatch => (
          "token_ownership_mismatch",
          "Token does not belong to the authenticated user".to_string(),
          None,
        ),
        AuthErrorKind::AccountLocked { remaining_seconds } => {
          builder.insert_header(("Retry-After", remaining_seconds.to_string()));
          (
            "account_locked",
            "Too many failed login attempts. Account temporarily locked".to_string(),
            Some(json!({ "remaining_seconds": remaining_seconds })),
          )
        }
        AuthErrorKind::RateLimited {
          limit,
          remaining,
          reset_at,
          retry_after,
        } => {
          builder.insert_header(("Retry-After", retry_after.to_string()));
          rate_limit_headers(&mut builder, *limit, *remaining, *reset_at);
          (
            "rate_limit_exceeded",
            "Too many requests. Please try again later".to_string(),
            Some(json!({ "retry_after": retry_after })),
          )
        }
      },
      ApiError::Unavailable => (
        "service_unavailable",
        "Service temporarily unavailable, please retry".to_string(),
        None,
      ),
      ApiError::Internal(msg) => {
        // Don't expose internal error details
        tracing::error!("Internal error: {}", msg);
        (
          "internal_error",
          "An internal server error occurred".to_string(),
          None,
        )
      }
    };

    let error_response = ErrorResponse {
      error: error_type.to_string(),
      message,
      details,
    };

    builder
      .content_type(ContentType::json())
      .json(error_response)
  }
}

/// Convert AuthError to ApiError
impl From<AuthError> for ApiError {
  fn from(error: AuthError) -> Self {
    match error {
      AuthError::InvalidCredentials => ApiError::Auth(AuthErrorKind::InvalidCredentials {
        remaining_attempts: None,
      }),
      AuthError::InvalidToken | AuthError::ExpiredToken => {
        ApiError::Auth(AuthErrorKind::InvalidToken)
      }
      AuthError::TokenRevoked => ApiError::Auth(AuthErrorKind::TokenRevoked),
      AuthError::TokenReuseDetected => ApiError::Auth(AuthErrorKind::TokenReuseDetected),
      AuthError::TokenOwnershipMismatch => ApiError::Auth(AuthErrorKind::TokenOwnershipMismatch),
      AuthError::AccountLocked { remaining } => ApiError::Auth(AuthErrorKind::AccountLocked {
        remaining_seconds: ceil_seconds(remaining),
      }),
      AuthError::RateLimited {
        limit,
        remaining,
        reset_at,
        retry_after,
      } => ApiError::Auth(AuthErrorKind::RateLimited {
        limit,
        remaining,
        reset_at,
        retry_after,
      }),
      AuthError::StoreUnavailable | AuthError::Timeout | AuthError::Cancelled => {
        ApiError::Unavailable
      }
      AuthError::ValueObject(err) => ApiError::Validation(err.to_string()),
      AuthError::Signing(msg) => ApiError::Internal(msg),
      AuthError::Hash(err) => ApiError::Internal(err.to_string()),
    }
  }
}

impl From<LoginFailure> for ApiError {
  fn from(failure: LoginFailure) -> Self {
    match failure.error {
      AuthError::InvalidCredentials => ApiError::Auth(AuthErrorKind::InvalidCredentials {
        remaining_attempts: failure.remaining_attempts,
      }),
      other => ApiError::from(other),
    }
  }
}

/// Convert validation errors from validator crate
impl From<validator::ValidationErrors> for ApiError {
  fn from(errors: validator::ValidationErrors) -> Self {
    let messages: Vec<String> = errors
      .field_errors()
      .iter()
      .flat_map(|(field, errors)| {
        errors
          .iter()
          .map(|error| {
            error
              .message
              .as_ref()
              .map(|m| m.to_string())
              .unwrap_or_else(|| format!("Invalid field: {}", field))
          })
          .collect::<Vec<_>>()
      })
      .collect();

    ApiError::Validation(messages.join(", "))
  }
}
