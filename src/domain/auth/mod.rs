pub mod entities;
pub mod errors;
pub mod lockout;
pub mod ports;
pub mod retry;
pub mod services;
pub mod token_service;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{RefreshTokenRecord, User};
pub use errors::{AuthError, HashError, RepositoryError, StoreError};
pub use lockout::{LockStatus, LockoutConfig, LockoutTracker};
pub use services::{AuthService, LoginFailure};
pub use token_service::{TokenService, TokenServiceConfig};
pub use value_objects::{
  AccessClaims, Deadline, Email, FamilyId, IdentityClaims, Interrupted, Password, PasswordHash,
  RefreshToken, TokenHash, TokenPair,
};
