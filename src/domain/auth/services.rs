use std::sync::Arc;

use tokio::sync::OnceCell;
use uuid::Uuid;

use super::entities::User;
use super::errors::AuthError;
use super::lockout::LockoutTracker;
use super::ports::{PasswordHasher, UserRepository};
use super::token_service::TokenService;
use super::value_objects::{
  AccessClaims, Deadline, Email, Password, PasswordHash, RefreshToken, TokenPair,
};

/// Outcome of a rejected password check
#[derive(Debug)]
pub struct LoginFailure {
  pub error: AuthError,
  /// Attempts left before lockout, when known
  pub remaining_attempts: Option<u32>,
}

impl From<AuthError> for LoginFailure {
  fn from(error: AuthError) -> Self {
    Self {
      error,
      remaining_attempts: None,
    }
  }
}

/// Orchestrates the login/refresh/logout boundary
///
/// Login consults the lockout tracker before checking credentials and
/// records the outcome afterwards. Token work is delegated to
/// [`TokenService`].
pub struct AuthService {
  users: Arc<dyn UserRepository>,
  password_hasher: Arc<dyn PasswordHasher>,
  lockout: Arc<LockoutTracker>,
  tokens: Arc<TokenService>,
  /// Checked against when the email is unknown, so that branch costs one
  /// password verification like every other
  decoy_hash: OnceCell<PasswordHash>,
}

const DECOY_PASSWORD: &str = "decoy-password-for-unknown-accounts";

impl AuthService {
  pub fn new(
    users: Arc<dyn UserRepository>,
    password_hasher: Arc<dyn PasswordHasher>,
    lockout: Arc<LockoutTracker>,
    tokens: Arc<TokenService>,
  ) -> Self {
    Self {
      users,
      password_hasher,
      lockout,
      tokens,
      decoy_hash: OnceCell::new(),
    }
  }

  /// Authenticates a user and starts a new token family
  ///
  /// # Errors
  /// - `AccountLocked` if the identifier is locked, including by this very failure
  /// - `InvalidCredentials` for an unknown email or a wrong password, with
  ///   the remaining attempt budget attached
  pub async fn login(
    &self,
    email: Email,
    password: Password,
    deadline: &Deadline,
  ) -> Result<(User, TokenPair), LoginFailure> {
    let identifier = email.as_str();

    let lock = self.lockout.is_locked(identifier, deadline).await?;
    if lock.locked {
      tracing::info!(remaining_seconds = lock.remaining.as_secs(), "Login refused, account locked");
      return Err(AuthError::AccountLocked {
        remaining: lock.remaining,
      }
      .into());
    }

    let user = match self.check_credentials(&email, &password, deadline).await? {
      Some(user) => user,
      None => return Err(self.record_failure(identifier, deadline).await),
    };

    self.lockout.reset_on_success(identifier, deadline).await?;

    let pair = self
      .tokens
      .issue_pair(user.id, &user.identity_claims(), deadline)
      .await?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok((user, pair))
  }

  /// `None` when the email is unknown or the password does not match
  async fn check_credentials(
    &self,
    email: &Email,
    password: &Password,
    deadline: &Deadline,
  ) -> Result<Option<User>, AuthError> {
    let Some(user) = deadline.run(self.users.find_by_email(email)).await?? else {
      self.verify_decoy(password, deadline).await?;
      return Ok(None);
    };

    let password_hash = PasswordHash::from_hash(&user.password_hash)?;
    let valid = deadline
      .run(self.password_hasher.verify(password, &password_hash))
      .await??;

    Ok(valid.then_some(user))
  }

  async fn verify_decoy(&self, password: &Password, deadline: &Deadline) -> Result<(), AuthError> {
    let decoy = deadline
      .run(self.decoy_hash.get_or_try_init(|| async {
        let decoy = Password::new(DECOY_PASSWORD).map_err(AuthError::from)?;
        self.password_hasher.hash(&decoy).await
      }))
      .await??;

    deadline
      .run(self.password_hasher.verify(password, decoy))
      .await??;
    Ok(())
  }

  async fn record_failure(&self, identifier: &str, deadline: &Deadline) -> LoginFailure {
    let status = match self.lockout.record_failure(identifier, deadline).await {
      Ok(status) => status,
      Err(error) => return error.into(),
    };

    if status.locked {
      return AuthError::AccountLocked {
        remaining: status.remaining,
      }
      .into();
    }

    let remaining_attempts = self
      .lockout
      .remaining_attempts(identifier, deadline)
      .await
      .ok();

    LoginFailure {
      error: AuthError::InvalidCredentials,
      remaining_attempts,
    }
  }

  pub async fn refresh(
    &self,
    refresh_token: &RefreshToken,
    deadline: &Deadline,
  ) -> Result<TokenPair, AuthError> {
    self.tokens.rotate(refresh_token, deadline).await
  }

  /// Logs out one session of `user_id`
  pub async fn logout(
    &self,
    user_id: Uuid,
    refresh_token: &RefreshToken,
    deadline: &Deadline,
  ) -> Result<(), AuthError> {
    self
      .tokens
      .revoke_for_user(user_id, refresh_token, deadline)
      .await
  }

  /// Logs out every session of `user_id`; returns how many tokens were revoked
  pub async fn logout_all(&self, user_id: Uuid, deadline: &Deadline) -> Result<u64, AuthError> {
    self.tokens.revoke_all_for_user(user_id, deadline).await
  }

  pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
    self.tokens.authenticate(access_token)
  }
}
