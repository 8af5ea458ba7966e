pub mod entities;
pub mod services;

pub use entities::{RateLimitDecision, RateLimitPolicy, RateLimiterState};
pub use services::RateLimiter;
