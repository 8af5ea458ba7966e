use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::entities::{RefreshTokenRecord, User};
use super::errors::{AuthError, RepositoryError, StoreError};
use super::value_objects::{
  AccessClaims, Email, FamilyId, IdentityClaims, Password, PasswordHash, SignedAccessToken,
  TokenHash,
};

/// Read-only lookup of user credentials
#[async_trait]
pub trait UserRepository: Send + Sync {
  /// Finds a user by their unique identifier
  async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

  /// Finds a user by their email address
  async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;
}

/// Durable storage of refresh-token records
#[async_trait]
pub trait TokenStore: Send + Sync {
  /// Inserts a new record outside of any rotation
  async fn insert(&self, record: RefreshTokenRecord) -> Result<(), RepositoryError>;

  /// Finds a record by the hash of its token
  async fn find_by_identity(
    &self,
    token_hash: &TokenHash,
  ) -> Result<Option<RefreshTokenRecord>, RepositoryError>;

  /// Sets `revoked_at` on every unrevoked record of the family, returning how many changed
  async fn revoke_family(
    &self,
    family_id: FamilyId,
    at: DateTime<Utc>,
  ) -> Result<u64, RepositoryError>;

  /// Revokes a single record if it is not revoked yet; `false` when it already was
  async fn revoke(&self, token_hash: &TokenHash, at: DateTime<Utc>)
  -> Result<bool, RepositoryError>;

  /// Revokes every unrevoked record owned by the user, across all families
  async fn revoke_all_for_user(
    &self,
    user_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<u64, RepositoryError>;

  /// Opens a unit of work for the rotation read-check-mutate-insert sequence
  async fn begin(&self) -> Result<Box<dyn RotationUnit>, RepositoryError>;
}

/// Transaction-scoped view of the token store
///
/// Everything done through a unit becomes visible atomically on `commit`.
/// Dropping the unit without committing discards its writes.
#[async_trait]
pub trait RotationUnit: Send {
  /// Loads a record and holds it against concurrent rotation until the unit ends
  async fn find_for_update(
    &mut self,
    token_hash: &TokenHash,
  ) -> Result<Option<RefreshTokenRecord>, RepositoryError>;

  /// Compare-and-set: revokes `token_hash` and links it to `successor` only if
  /// it is still unrevoked and unlinked. Returns whether this unit won.
  async fn mark_revoked_and_link(
    &mut self,
    token_hash: &TokenHash,
    successor: Uuid,
    at: DateTime<Utc>,
  ) -> Result<bool, RepositoryError>;

  async fn insert(&mut self, record: RefreshTokenRecord) -> Result<(), RepositoryError>;

  async fn revoke_family(
    &mut self,
    family_id: FamilyId,
    at: DateTime<Utc>,
  ) -> Result<u64, RepositoryError>;

  async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Ephemeral key-value store with per-key expiry (the keyed counter store)
///
/// In a multi-instance deployment this must be shared by every instance,
/// since lockout correctness depends on a global atomic increment.
#[async_trait]
pub trait TtlStore: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

  async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

  /// Atomically increments the counter and returns the new value. When the
  /// increment creates the key, its expiry is set to `ttl_on_create`.
  async fn increment(&self, key: &str, ttl_on_create: Duration) -> Result<i64, StoreError>;

  /// Resets the expiry of an existing key; `false` if the key does not exist
  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

  /// Residual time-to-live; `None` when the key is absent or never expires
  async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

  async fn delete(&self, keys: &[&str]) -> Result<(), StoreError>;
}

/// Service trait for password hashing operations
#[async_trait]
pub trait PasswordHasher: Send + Sync {
  /// Hashes a plain text password
  async fn hash(&self, password: &Password) -> Result<PasswordHash, AuthError>;

  /// Verifies a plain text password against a hashed password
  async fn verify(
    &self,
    password: &Password,
    hashed_password: &PasswordHash,
  ) -> Result<bool, AuthError>;
}

/// Produces and checks short-lived signed access credentials
pub trait AccessTokenSigner: Send + Sync {
  fn sign(
    &self,
    user_id: Uuid,
    claims: &IdentityClaims,
    ttl: chrono::Duration,
  ) -> Result<SignedAccessToken, AuthError>;

  fn verify(&self, token: &str) -> Result<AccessClaims, AuthError>;
}

/// Service trait for secure token generation
pub trait TokenGenerator: Send + Sync {
  /// Generates an unguessable refresh token string
  fn generate(&self) -> Result<String, AuthError>;
}
