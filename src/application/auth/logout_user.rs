use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::auth::errors::AuthError;
use crate::domain::auth::services::AuthService;
use crate::domain::auth::value_objects::{Deadline, RefreshToken};

/// Use case for logging out one session of the authenticated user
pub struct LogoutUserUseCase {
  auth_service: Arc<AuthService>,
  timeout: Duration,
}

impl LogoutUserUseCase {
  pub fn new(auth_service: Arc<AuthService>, timeout: Duration) -> Self {
    Self {
      auth_service,
      timeout,
    }
  }

  /// Revokes `refresh_token` after checking it belongs to `user_id`
  ///
  /// # Errors
  /// - `TokenOwnershipMismatch` if the token belongs to someone else
  /// - `TokenRevoked` if it was already revoked
  pub async fn execute(&self, user_id: Uuid, refresh_token: String) -> Result<(), AuthError> {
    let refresh_token =
      RefreshToken::from_string(refresh_token).map_err(|_| AuthError::InvalidToken)?;
    let deadline = Deadline::after(self.timeout);

    self
      .auth_service
      .logout(user_id, &refresh_token, &deadline)
      .await
  }
}
