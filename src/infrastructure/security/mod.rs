mod argon2_hasher;
mod jwt_signer;
mod token_generator;

pub use argon2_hasher::Argon2PasswordHasher;
pub use jwt_signer::JwtAccessTokenSigner;
pub use token_generator::SecureTokenGenerator;
