use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Request for user login
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
  /// User's email address
  #[validate(email(message = "Invalid email format"))]
  pub email: String,

  /// User's password
  #[validate(length(min = 1, max = 128, message = "Password is required"))]
  pub password: String,
}

/// Request carrying a refresh token, for `/refresh` and `/logout`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshTokenRequest {
  #[validate(length(min = 1, max = 256, message = "Refresh token is required"))]
  pub refresh_token: String,
}

/// Access/refresh token pair
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
  pub access_token: String,

  /// Replaces the presented refresh token, which is now spent
  pub refresh_token: String,

  /// Always `Bearer`
  pub token_type: &'static str,

  /// Access token lifetime in seconds
  pub expires_in: i64,
}

impl TokenResponse {
  pub fn bearer(access_token: String, refresh_token: String, expires_in: i64) -> Self {
    Self {
      access_token,
      refresh_token,
      token_type: "Bearer",
      expires_in,
    }
  }
}

/// Response after successful user login
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
  /// Unique identifier of the user
  pub user_id: Uuid,

  /// User's email address
  pub email: String,

  #[serde(flatten)]
  pub tokens: TokenResponse,
}

/// Response after logging out from all devices
#[derive(Debug, Clone, Serialize)]
pub struct LogoutAllResponse {
  /// Number of refresh tokens that were revoked
  pub sessions_terminated: u64,

  pub message: String,
}

/// Standard error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
  /// Error type identifier
  pub error: String,

  /// Human-readable error message
  pub message: String,

  /// Additional error details (optional)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<serde_json::Value>,
}

/// Standard success response
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_login_request_rejects_bad_email() {
    let request = LoginRequest {
      email: "not-an-email".to_string(),
      password: "secret".to_string(),
    };

    assert!(request.validate().is_err());
  }

  #[test]
  fn test_login_request_requires_password() {
    let request = LoginRequest {
      email: "a@b.com".to_string(),
      password: String::new(),
    };

    assert!(request.validate().is_err());
  }

  #[test]
  fn test_login_response_flattens_tokens() {
    let response = LoginResponse {
      user_id: Uuid::nil(),
      email: "a@b.com".to_string(),
      tokens: TokenResponse::bearer("access".to_string(), "refresh".to_string(), 900),
    };

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["access_token"], "access");
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["expires_in"], 900);
  }
}
