use argon2::password_hash::SaltString;
use argon2::{
  Algorithm, Argon2, Params, Version,
  password_hash::{
    PasswordHash as Argon2PasswordHash, PasswordHasher as Argon2PasswordHasherTrait,
    PasswordVerifier,
  },
};
use async_trait::async_trait;

use crate::domain::auth::errors::{AuthError, HashError};
use crate::domain::auth::ports::PasswordHasher;
use crate::domain::auth::value_objects::{Password, PasswordHash};

/// Argon2id password hasher
///
/// Parameters: 19 MiB memory, 2 iterations, 1 lane. Hashing and verification
/// run on the blocking thread pool so a login burst does not stall the
/// async workers.
#[derive(Clone)]
pub struct Argon2PasswordHasher {
  argon2: Argon2<'static>,
}

impl Argon2PasswordHasher {
  pub fn new() -> Result<Self, AuthError> {
    let params = Params::new(19456, 2, 1, Some(32)).map_err(|e| {
      AuthError::Hash(HashError::HashingFailed(format!(
        "Failed to create Argon2 params: {}",
        e
      )))
    })?;

    Ok(Self {
      argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
    })
  }
}

async fn blocking<T, F>(task: F) -> Result<T, AuthError>
where
  F: FnOnce() -> Result<T, AuthError> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(task)
    .await
    .map_err(|e| AuthError::Hash(HashError::HashingFailed(format!("Hashing task failed: {}", e))))?
}

#[async_trait]
impl PasswordHasher for Argon2PasswordHasher {
  async fn hash(&self, password: &Password) -> Result<PasswordHash, AuthError> {
    let argon2 = self.argon2.clone();
    let password = password.clone();

    blocking(move || {
      let salt = SaltString::generate(&mut rand::rngs::OsRng);
      let hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| {
          AuthError::Hash(HashError::HashingFailed(format!(
            "Failed to hash password: {}",
            e
          )))
        })?;

      PasswordHash::from_hash(hash.to_string()).map_err(|_| AuthError::Hash(HashError::InvalidFormat))
    })
    .await
  }

  /// Constant-time comparison is done by argon2's `verify_password`
  async fn verify(
    &self,
    password: &Password,
    hashed_password: &PasswordHash,
  ) -> Result<bool, AuthError> {
    let argon2 = self.argon2.clone();
    let password = password.clone();
    let hashed_password = hashed_password.clone();

    blocking(move || {
      let parsed_hash = Argon2PasswordHash::new(hashed_password.as_str()).map_err(|e| {
        AuthError::Hash(HashError::VerificationFailed(format!(
          "Invalid hash format: {}",
          e
        )))
      })?;

      match argon2.verify_password(password.as_str().as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Hash(HashError::VerificationFailed(format!(
          "Password verification failed: {}",
          e
        )))),
      }
    })
    .await
  }
}
