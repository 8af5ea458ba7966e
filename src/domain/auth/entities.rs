use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{FamilyId, IdentityClaims, TokenHash};

/// User entity, reduced to what authentication needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  /// Unique identifier for the user
  pub id: Uuid,
  /// User's email address (unique, lowercase)
  pub email: String,
  /// Hashed password using Argon2
  pub password_hash: String,
  /// Timestamp when the user was created
  pub created_at: DateTime<Utc>,
  /// Timestamp when the user was last updated
  pub updated_at: DateTime<Utc>,
}

impl User {
  /// Creates a new user with the given details
  pub fn new(email: String, password_hash: String) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      email,
      password_hash,
      created_at: now,
      updated_at: now,
    }
  }

  /// Creates a user from database fields (for reconstruction)
  pub fn from_db(
    id: Uuid,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
  ) -> Self {
    Self {
      id,
      email,
      password_hash,
      created_at,
      updated_at,
    }
  }

  /// Claims to embed into access credentials minted for this user
  pub fn identity_claims(&self) -> IdentityClaims {
    IdentityClaims {
      email: self.email.clone(),
    }
  }
}

/// Server-side record of one issued refresh token
///
/// Records in a family form a singly linked chain through `replaced_by`.
/// Only `revoked_at` and `replaced_by` ever change after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
  pub id: Uuid,
  /// SHA-256 of the plaintext token; the lookup identity
  pub token_hash: TokenHash,
  pub family_id: FamilyId,
  pub user_id: Uuid,
  pub issued_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub revoked_at: Option<DateTime<Utc>>,
  /// Id of the record that superseded this one
  pub replaced_by: Option<Uuid>,
}

impl RefreshTokenRecord {
  /// First record of a brand-new family (a fresh login)
  pub fn issue(token_hash: TokenHash, user_id: Uuid, ttl: Duration) -> Self {
    Self::in_family(token_hash, FamilyId::new(), user_id, ttl)
  }

  /// Record that will supersede `self` within the same family
  pub fn successor(&self, token_hash: TokenHash, ttl: Duration) -> Self {
    Self::in_family(token_hash, self.family_id, self.user_id, ttl)
  }

  fn in_family(token_hash: TokenHash, family_id: FamilyId, user_id: Uuid, ttl: Duration) -> Self {
    let issued_at = Utc::now();
    Self {
      id: Uuid::new_v4(),
      token_hash,
      family_id,
      user_id,
      issued_at,
      expires_at: issued_at + ttl,
      revoked_at: None,
      replaced_by: None,
    }
  }

  /// Creates a record from database fields (for reconstruction)
  #[allow(clippy::too_many_arguments)]
  pub fn from_db(
    id: Uuid,
    token_hash: TokenHash,
    family_id: FamilyId,
    user_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    replaced_by: Option<Uuid>,
  ) -> Self {
    Self {
      id,
      token_hash,
      family_id,
      user_id,
      issued_at,
      expires_at,
      revoked_at,
      replaced_by,
    }
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.expires_at <= now
  }

  pub fn is_revoked(&self) -> bool {
    self.revoked_at.is_some()
  }

  /// Already rotated away from; presenting it again is reuse
  pub fn is_superseded(&self) -> bool {
    self.replaced_by.is_some()
  }

  pub fn revoke(&mut self, at: DateTime<Utc>) {
    if self.revoked_at.is_none() {
      self.revoked_at = Some(at);
    }
  }

  /// Closes this link of the chain in favour of `successor`
  pub fn link_successor(&mut self, successor: Uuid, at: DateTime<Utc>) {
    self.revoke(at);
    self.replaced_by = Some(successor);
  }
}
