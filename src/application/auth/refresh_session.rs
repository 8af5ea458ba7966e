use std::sync::Arc;
use std::time::Duration;

use crate::domain::auth::errors::AuthError;
use crate::domain::auth::services::AuthService;
use crate::domain::auth::value_objects::{Deadline, RefreshToken};

#[derive(Debug, Clone)]
pub struct RefreshSessionResponse {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_in: i64,
}

/// Exchanges a refresh token for a new access/refresh pair
pub struct RefreshSessionUseCase {
  auth_service: Arc<AuthService>,
  timeout: Duration,
}

impl RefreshSessionUseCase {
  pub fn new(auth_service: Arc<AuthService>, timeout: Duration) -> Self {
    Self {
      auth_service,
      timeout,
    }
  }

  pub async fn execute(&self, refresh_token: String) -> Result<RefreshSessionResponse, AuthError> {
    // A malformed token can never match a stored one
    let refresh_token =
      RefreshToken::from_string(refresh_token).map_err(|_| AuthError::InvalidToken)?;
    let deadline = Deadline::after(self.timeout);

    let pair = self.auth_service.refresh(&refresh_token, &deadline).await?;

    Ok(RefreshSessionResponse {
      access_token: pair.access_token,
      refresh_token: pair.refresh_token.into_inner(),
      expires_in: pair.expires_in,
    })
  }
}
