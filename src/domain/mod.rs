pub mod auth;
pub mod rate_limit;

// Re-export auth module for easier access
pub use auth::*;
