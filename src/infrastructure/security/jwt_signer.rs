use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::auth::errors::AuthError;
use crate::domain::auth::ports::AccessTokenSigner;
use crate::domain::auth::value_objects::{AccessClaims, IdentityClaims, SignedAccessToken};

const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
  sub: Uuid,
  email: String,
  iss: String,
  iat: i64,
  exp: i64,
  jti: String,
}

/// HS256 access-token signer
pub struct JwtAccessTokenSigner {
  encoding_key: EncodingKey,
  decoding_key: DecodingKey,
  validation: Validation,
  issuer: String,
}

impl JwtAccessTokenSigner {
  pub fn new(secret: &str, issuer: impl Into<String>) -> Result<Self, AuthError> {
    if secret.len() < MIN_SECRET_LENGTH {
      return Err(AuthError::Signing(format!(
        "JWT secret must be at least {} bytes",
        MIN_SECRET_LENGTH
      )));
    }

    let issuer = issuer.into();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[issuer.as_str()]);
    validation.leeway = 0;

    Ok(Self {
      encoding_key: EncodingKey::from_secret(secret.as_bytes()),
      decoding_key: DecodingKey::from_secret(secret.as_bytes()),
      validation,
      issuer,
    })
  }
}

impl AccessTokenSigner for JwtAccessTokenSigner {
  fn sign(
    &self,
    user_id: Uuid,
    claims: &IdentityClaims,
    ttl: chrono::Duration,
  ) -> Result<SignedAccessToken, AuthError> {
    let now = Utc::now();
    let claims = Claims {
      sub: user_id,
      email: claims.email.clone(),
      iss: self.issuer.clone(),
      iat: now.timestamp(),
      exp: (now + ttl).timestamp(),
      jti: Uuid::new_v4().to_string(),
    };

    let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
      .map_err(|e| AuthError::Signing(e.to_string()))?;

    Ok(SignedAccessToken {
      token,
      expires_in: ttl.num_seconds(),
    })
  }

  fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
    let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
      tracing::debug!(error = %e, "Access token rejected");
      match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => AuthError::InvalidToken,
      }
    })?;

    Ok(AccessClaims {
      user_id: data.claims.sub,
      email: data.claims.email,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";

  fn claims() -> IdentityClaims {
    IdentityClaims {
      email: "a@b.com".to_string(),
    }
  }

  #[test]
  fn test_sign_and_verify() {
    let signer = JwtAccessTokenSigner::new(SECRET, "sessionguard").unwrap();
    let user_id = Uuid::new_v4();

    let signed = signer
      .sign(user_id, &claims(), chrono::Duration::minutes(15))
      .unwrap();
    assert_eq!(signed.expires_in, 900);

    let verified = signer.verify(&signed.token).unwrap();
    assert_eq!(verified.user_id, user_id);
    assert_eq!(verified.email, "a@b.com");
  }

  #[test]
  fn test_rejects_short_secret() {
    assert!(JwtAccessTokenSigner::new("short", "sessionguard").is_err());
  }

  #[test]
  fn test_rejects_expired_token() {
    let signer = JwtAccessTokenSigner::new(SECRET, "sessionguard").unwrap();
    let signed = signer
      .sign(Uuid::new_v4(), &claims(), chrono::Duration::seconds(-10))
      .unwrap();

    assert!(matches!(signer.verify(&signed.token), Err(AuthError::ExpiredToken)));
  }

  #[test]
  fn test_rejects_foreign_issuer_and_key() {
    let signer = JwtAccessTokenSigner::new(SECRET, "sessionguard").unwrap();
    let other_issuer = JwtAccessTokenSigner::new(SECRET, "elsewhere").unwrap();
    let other_key =
      JwtAccessTokenSigner::new("another-secret-that-is-at-least-32-bytes", "sessionguard").unwrap();

    let signed = other_issuer
      .sign(Uuid::new_v4(), &claims(), chrono::Duration::minutes(5))
      .unwrap();
    assert!(matches!(signer.verify(&signed.token), Err(AuthError::InvalidToken)));

    let signed = other_key
      .sign(Uuid::new_v4(), &claims(), chrono::Duration::minutes(5))
      .unwrap();
    assert!(matches!(signer.verify(&signed.token), Err(AuthError::InvalidToken)));
  }
}
