use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

use crate::domain::auth::errors::AuthError;
use crate::domain::auth::ports::TokenGenerator;

/// Refresh-token generator backed by the operating system's CSPRNG
///
/// Produces 32 random bytes encoded as unpadded base64url (43 characters).
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureTokenGenerator;

impl SecureTokenGenerator {
  const TOKEN_BYTES: usize = 32;

  pub fn new() -> Self {
    Self
  }
}

impl TokenGenerator for SecureTokenGenerator {
  fn generate(&self) -> Result<String, AuthError> {
    let mut token_bytes = [0u8; Self::TOKEN_BYTES];
    rand::rngs::OsRng
      .try_fill_bytes(&mut token_bytes)
      .map_err(|e| AuthError::Signing(format!("Random source unavailable: {}", e)))?;

    Ok(URL_SAFE_NO_PAD.encode(token_bytes))
  }
}
