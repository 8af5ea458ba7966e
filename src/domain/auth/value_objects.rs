use std::fmt;
use std::future::Future;
use std::time::Duration;

use argon2::PasswordHash as Argon2PasswordHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validator::ValidateEmail;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ValueObjectError {
  #[error("Invalid email format: {0}")]
  InvalidEmail(String),

  #[error("Password is too short (minimum 8 characters)")]
  PasswordTooShort,

  #[error("Password is too long (maximum 128 characters)")]
  PasswordTooLong,

  #[error("Invalid password hash format")]
  InvalidPasswordHash,

  #[error("Invalid token format")]
  InvalidToken,
}

// ============================================================================
// Email Value Object
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
  /// Creates a new Email after validation
  pub fn new(email: impl Into<String>) -> Result<Self, ValueObjectError> {
    let email = email.into();
    let trimmed = email.trim();

    if !trimmed.validate_email() {
      return Err(ValueObjectError::InvalidEmail(email));
    }

    // Normalize to lowercase so lockout counters cannot be dodged by casing
    Ok(Self(trimmed.to_lowercase()))
  }

  /// Returns the email as a string slice
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Consumes self and returns the inner String
  pub fn into_inner(self) -> String {
    self.0
  }
}

impl fmt::Display for Email {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl AsRef<str> for Email {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

// ============================================================================
// Password Value Object (Plain Password - Never Stored)
// ============================================================================

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Password(String);

impl Password {
  const MIN_LENGTH: usize = 8;
  const MAX_LENGTH: usize = 128;

  /// Creates a new Password after validation
  pub fn new(password: impl Into<String>) -> Result<Self, ValueObjectError> {
    let password = password.into();

    if password.len() < Self::MIN_LENGTH {
      return Err(ValueObjectError::PasswordTooShort);
    }

    if password.len() > Self::MAX_LENGTH {
      return Err(ValueObjectError::PasswordTooLong);
    }

    Ok(Self(password))
  }

  /// Returns the password as a string slice (use with caution)
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for Password {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Password(***)")
  }
}

// ============================================================================
// PasswordHash Value Object (Argon2id PHC string)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordHash(String);

impl PasswordHash {
  /// Creates a new PasswordHash from an existing PHC hash string
  pub fn from_hash(hash: impl Into<String>) -> Result<Self, ValueObjectError> {
    let hash = hash.into();

    Argon2PasswordHash::new(&hash).map_err(|_| ValueObjectError::InvalidPasswordHash)?;

    Ok(Self(hash))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn into_inner(self) -> String {
    self.0
  }
}

// ============================================================================
// RefreshToken Value Object (opaque bearer secret handed to the client)
// ============================================================================

/// Plaintext refresh token. Only its [`TokenHash`] is ever persisted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RefreshToken(String);

impl RefreshToken {
  /// 32 random bytes encoded as unpadded base64url
  pub const ENCODED_LENGTH: usize = 43;

  /// Parses a token presented by a client
  pub fn from_string(token: impl Into<String>) -> Result<Self, ValueObjectError> {
    let token = token.into();

    if token.len() != Self::ENCODED_LENGTH {
      return Err(ValueObjectError::InvalidToken);
    }

    if !token
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
      return Err(ValueObjectError::InvalidToken);
    }

    Ok(Self(token))
  }

  /// SHA-256 of the token, hex encoded; this is the stored identity
  pub fn hash(&self) -> TokenHash {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(self.0.as_bytes());

    TokenHash(hex::encode(hasher.finalize()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn into_inner(self) -> String {
    self.0.clone()
  }
}

impl fmt::Debug for RefreshToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("RefreshToken(***)")
  }
}

// ============================================================================
// TokenHash Value Object (SHA-256 Hash of a RefreshToken)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenHash(String);

impl TokenHash {
  /// Creates a TokenHash from an existing hash string
  pub fn from_hash(hash: impl Into<String>) -> Result<Self, ValueObjectError> {
    let hash = hash.into();

    // SHA-256 produces 64 hex characters
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err(ValueObjectError::InvalidToken);
    }

    Ok(Self(hash.to_ascii_lowercase()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn into_inner(self) -> String {
    self.0
  }
}

impl fmt::Display for TokenHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ============================================================================
// FamilyId Value Object
// ============================================================================

/// Identifies the rotation chain that descends from one login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FamilyId(Uuid);

impl FamilyId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }

  pub fn from_uuid(uuid: Uuid) -> Self {
    Self(uuid)
  }

  pub fn into_inner(self) -> Uuid {
    self.0
  }
}

impl Default for FamilyId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for FamilyId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ============================================================================
// Token issuance values
// ============================================================================

/// Identity claims embedded into the access credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
  pub email: String,
}

/// Signed access credential as produced by an `AccessTokenSigner`
#[derive(Debug, Clone)]
pub struct SignedAccessToken {
  pub token: String,
  pub expires_in: i64,
}

/// Claims recovered from a verified access credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
  pub user_id: Uuid,
  pub email: String,
}

/// Result of a successful login or rotation
#[derive(Debug, Clone)]
pub struct TokenPair {
  pub access_token: String,
  pub refresh_token: RefreshToken,
  /// Access token lifetime in seconds
  pub expires_in: i64,
}

// ============================================================================
// Deadline
// ============================================================================

/// Why a bounded operation stopped before completing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
  TimedOut,
  Cancelled,
}

/// Caller-supplied bound on an operation: an optional instant and an optional
/// cancellation signal. Passed explicitly to every core operation.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
  at: Option<Instant>,
  cancellation: Option<CancellationToken>,
}

impl Deadline {
  /// No bound at all
  pub fn none() -> Self {
    Self::default()
  }

  pub fn after(timeout: Duration) -> Self {
    Self {
      at: Some(Instant::now() + timeout),
      cancellation: None,
    }
  }

  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancellation = Some(token);
    self
  }

  /// Fails if the deadline already passed or the caller cancelled
  pub fn check(&self) -> Result<(), Interrupted> {
    if self
      .cancellation
      .as_ref()
      .is_some_and(CancellationToken::is_cancelled)
    {
      return Err(Interrupted::Cancelled);
    }

    match self.at {
      Some(at) if at <= Instant::now() => Err(Interrupted::TimedOut),
      _ => Ok(()),
    }
  }

  /// Drives `future` until it completes, the deadline passes, or the caller
  /// cancels, whichever happens first. An interrupted future is dropped.
  pub async fn run<F>(&self, future: F) -> Result<F::Output, Interrupted>
  where
    F: Future,
  {
    self.check()?;

    let expiry = async {
      match self.at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
      }
    };

    let cancelled = async {
      match &self.cancellation {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
      }
    };

    tokio::select! {
      biased;
      _ = cancelled => Err(Interrupted::Cancelled),
      _ = expiry => Err(Interrupted::TimedOut),
      output = future => Ok(output),
    }
  }
}
