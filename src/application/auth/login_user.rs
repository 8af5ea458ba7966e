use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::auth::errors::AuthError;
use crate::domain::auth::services::{AuthService, LoginFailure};
use crate::domain::auth::value_objects::{Deadline, Email, Password};

/// Command for logging in a user
#[derive(Debug, Clone)]
pub struct LoginUserCommand {
  pub email: String,
  /// Plain text, never logged
  pub password: String,
}

/// Response after successful user login
#[derive(Debug, Clone)]
pub struct LoginUserResponse {
  pub user_id: Uuid,
  pub email: String,
  pub access_token: String,
  pub refresh_token: String,
  /// Access token lifetime in seconds
  pub expires_in: i64,
}

/// Use case for logging in a user
pub struct LoginUserUseCase {
  auth_service: Arc<AuthService>,
  timeout: Duration,
}

impl LoginUserUseCase {
  pub fn new(auth_service: Arc<AuthService>, timeout: Duration) -> Self {
    Self {
      auth_service,
      timeout,
    }
  }

  /// Executes the user login use case
  ///
  /// # Errors
  /// Returns `LoginFailure` carrying the `AuthError` and, for bad
  /// credentials, the attempts left before the account locks
  pub async fn execute(&self, command: LoginUserCommand) -> Result<LoginUserResponse, LoginFailure> {
    let email = Email::new(command.email).map_err(AuthError::from)?;
    let password = Password::new(command.password).map_err(AuthError::from)?;
    let deadline = Deadline::after(self.timeout);

    let (user, pair) = self.auth_service.login(email, password, &deadline).await?;

    Ok(LoginUserResponse {
      user_id: user.id,
      email: user.email,
      access_token: pair.access_token,
      refresh_token: pair.refresh_token.into_inner(),
      expires_in: pair.expires_in,
    })
  }
}
