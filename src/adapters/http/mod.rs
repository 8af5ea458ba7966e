pub mod dtos;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod routes;

// Re-export commonly used types
pub use dtos::{
  ErrorResponse, LoginRequest, LoginResponse, LogoutAllResponse, RefreshTokenRequest,
  SuccessResponse, TokenResponse,
};
pub use errors::{ApiError, AuthErrorKind};
pub use handlers::auth::{
  health_handler, login_handler, logout_all_handler, logout_handler, refresh_handler,
};
pub use middleware::{AuthMiddleware, AuthenticatedUser, RateLimitMiddleware};
pub use routes::{AuthRouteDependencies, configure_auth_routes};
