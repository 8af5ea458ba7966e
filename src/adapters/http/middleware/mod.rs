pub mod auth;
pub mod rate_limit;

// Re-export middleware components for easier access
pub use auth::{AuthMiddleware, AuthenticatedUser};
pub use rate_limit::RateLimitMiddleware;
