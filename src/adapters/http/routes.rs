use actix_web::web;
use std::sync::Arc;

use crate::application::auth::{
  LoginUserUseCase, LogoutAllDevicesUseCase, LogoutUserUseCase, RefreshSessionUseCase,
};
use crate::domain::auth::services::AuthService;
use crate::domain::rate_limit::RateLimiter;

use super::handlers::auth::{login_handler, logout_all_handler, logout_handler, refresh_handler};
use super::middleware::{AuthMiddleware, RateLimitMiddleware};

/// Dependencies for the authentication routes
#[derive(Clone)]
pub struct AuthRouteDependencies {
  pub auth_service: Arc<AuthService>,
  pub login_use_case: Arc<LoginUserUseCase>,
  pub refresh_use_case: Arc<RefreshSessionUseCase>,
  pub logout_use_case: Arc<LogoutUserUseCase>,
  pub logout_all_use_case: Arc<LogoutAllDevicesUseCase>,
  pub login_limiter: Arc<RateLimiter>,
  pub refresh_limiter: Arc<RateLimiter>,
  pub api_limiter: Arc<RateLimiter>,
}

/// Configure authentication routes
///
/// Mounts all authentication-related endpoints under the provided scope.
/// All routes are prefixed with the scope path (e.g., /api/v1/auth).
///
/// # Routes
///
/// - POST /login - Authenticate and start a token family (login limiter)
/// - POST /refresh - Rotate a refresh token (refresh limiter)
/// - POST /logout - Revoke one of the caller's refresh tokens (bearer, api limiter)
/// - POST /logout-all - Revoke every refresh token of the caller (bearer, api limiter)
///
/// Admission control runs before bearer authentication, so rejected
/// credentials still draw from the caller's bucket. The last `wrap` runs first.
pub fn configure_auth_routes(cfg: &mut web::ServiceConfig, deps: AuthRouteDependencies) {
  cfg
    .app_data(web::Data::new(deps.login_use_case))
    .app_data(web::Data::new(deps.refresh_use_case))
    .app_data(web::Data::new(deps.logout_use_case))
    .app_data(web::Data::new(deps.logout_all_use_case))
    .service(
      web::resource("/login")
        .wrap(RateLimitMiddleware::new(deps.login_limiter))
        .route(web::post().to(login_handler)),
    )
    .service(
      web::resource("/refresh")
        .wrap(RateLimitMiddleware::new(deps.refresh_limiter))
        .route(web::post().to(refresh_handler)),
    )
    .service(
      web::resource("/logout")
        .wrap(AuthMiddleware::new(deps.auth_service.clone()))
        .wrap(RateLimitMiddleware::new(deps.api_limiter.clone()))
        .route(web::post().to(logout_handler)),
    )
    .service(
      web::resource("/logout-all")
        .wrap(AuthMiddleware::new(deps.auth_service))
        .wrap(RateLimitMiddleware::new(deps.api_limiter))
        .route(web::post().to(logout_all_handler)),
    );
}
