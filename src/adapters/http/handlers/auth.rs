use actix_web::{HttpResponse, web};
use std::sync::Arc;
use validator::Validate;

use crate::adapters::http::{
  dtos::{
    LoginRequest, LoginResponse, LogoutAllResponse, RefreshTokenRequest, SuccessResponse,
    TokenResponse,
  },
  errors::ApiError,
  middleware::AuthenticatedUser,
};
use crate::application::auth::{
  LoginUserCommand, LoginUserUseCase, LogoutAllDevicesUseCase, LogoutUserUseCase,
  RefreshSessionUseCase,
};

/// Handler for user login
///
/// POST /api/v1/auth/login
/// Body: LoginRequest (JSON)
/// Response: LoginResponse (JSON) with status 200
pub async fn login_handler(
  request: web::Json<LoginRequest>,
  use_case: web::Data<Arc<LoginUserUseCase>>,
) -> Result<HttpResponse, ApiError> {
  request.validate()?;

  let LoginRequest { email, password } = request.into_inner();
  let response = use_case
    .execute(LoginUserCommand { email, password })
    .await?;

  Ok(HttpResponse::Ok().json(LoginResponse {
    user_id: response.user_id,
    email: response.email,
    tokens: TokenResponse::bearer(
      response.access_token,
      response.refresh_token,
      response.expires_in,
    ),
  }))
}

/// Handler for refresh token rotation
///
/// POST /api/v1/auth/refresh
/// Body: RefreshTokenRequest (JSON)
/// Response: TokenResponse (JSON) with status 200
///
/// The presented token is spent on success. Presenting it again revokes every
/// session that descends from the same login.
pub async fn refresh_handler(
  request: web::Json<RefreshTokenRequest>,
  use_case: web::Data<Arc<RefreshSessionUseCase>>,
) -> Result<HttpResponse, ApiError> {
  request.validate()?;

  let response = use_case.execute(request.into_inner().refresh_token).await?;

  Ok(HttpResponse::Ok().json(TokenResponse::bearer(
    response.access_token,
    response.refresh_token,
    response.expires_in,
  )))
}

/// Handler for user logout
///
/// POST /api/v1/auth/logout
/// Headers: Authorization: Bearer <access token>
/// Body: RefreshTokenRequest (JSON)
/// Response: SuccessResponse (JSON) with status 200
pub async fn logout_handler(
  user: AuthenticatedUser,
  request: web::Json<RefreshTokenRequest>,
  use_case: web::Data<Arc<LogoutUserUseCase>>,
) -> Result<HttpResponse, ApiError> {
  request.validate()?;

  use_case
    .execute(user.user_id, request.into_inner().refresh_token)
    .await?;

  Ok(HttpResponse::Ok().json(SuccessResponse {
    message: "Successfully logged out".to_string(),
  }))
}

/// Handler for logging out from all devices
///
/// POST /api/v1/auth/logout-all
/// Headers: Authorization: Bearer <access token>
/// Response: LogoutAllResponse (JSON) with status 200
pub async fn logout_all_handler(
  user: AuthenticatedUser,
  use_case: web::Data<Arc<LogoutAllDevicesUseCase>>,
) -> Result<HttpResponse, ApiError> {
  let response = use_case.execute(user.user_id).await?;

  Ok(HttpResponse::Ok().json(LogoutAllResponse {
    sessions_terminated: response.sessions_terminated,
    message: format!(
      "Successfully logged out from {} device(s)",
      response.sessions_terminated
    ),
  }))
}

/// GET /health
pub async fn health_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
