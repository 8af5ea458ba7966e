use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::auth::errors::AuthError;
use crate::domain::auth::services::AuthService;
use crate::domain::auth::value_objects::Deadline;

/// Response after logging out from all devices
#[derive(Debug, Clone)]
pub struct LogoutAllDevicesResponse {
  /// Number of refresh tokens that were revoked
  pub sessions_terminated: u64,
}

/// Use case for logging out a user from all devices
pub struct LogoutAllDevicesUseCase {
  auth_service: Arc<AuthService>,
  timeout: Duration,
}

impl LogoutAllDevicesUseCase {
  pub fn new(auth_service: Arc<AuthService>, timeout: Duration) -> Self {
    Self {
      auth_service,
      timeout,
    }
  }

  pub async fn execute(&self, user_id: Uuid) -> Result<LogoutAllDevicesResponse, AuthError> {
    let deadline = Deadline::after(self.timeout);
    let sessions_terminated = self.auth_service.logout_all(user_id, &deadline).await?;

    Ok(LogoutAllDevicesResponse {
      sessions_terminated,
    })
  }
}
