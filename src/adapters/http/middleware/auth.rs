use actix_web::{
  Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
  body::EitherBody,
  dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures_util::future::LocalBoxFuture;
use std::{
  future::{Ready, ready},
  rc::Rc,
  sync::Arc,
};
use uuid::Uuid;

use crate::{
  adapters::http::errors::{ApiError, AuthErrorKind},
  domain::auth::services::AuthService,
};

/// Caller identity established from a valid access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
  pub email: String,
}

/// Authentication middleware that verifies bearer access tokens
///
/// This middleware:
/// 1. Extracts the access token from the Authorization header
/// 2. Verifies signature, issuer and expiry through `AuthService::authenticate`
/// 3. Attaches an [`AuthenticatedUser`] to request extensions
/// 4. Returns 401 Unauthorized if the token is missing, invalid or expired
///
/// Verification is stateless: no store is consulted, so a revoked session
/// keeps a usable access token until it expires.
pub struct AuthMiddleware {
  auth_service: Arc<AuthService>,
}

impl AuthMiddleware {
  pub fn new(auth_service: Arc<AuthService>) -> Self {
    Self { auth_service }
  }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
  S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
  S::Future: 'static,
  B: 'static,
{
  type Response = ServiceResponse<EitherBody<B>>;
  type Error = Error;
  type Transform = AuthMiddlewareService<S>;
  type InitError = ();
  type Future = Ready<Result<Self::Transform, Self::InitError>>;

  fn new_transform(&self, service: S) -> Self::Future {
    ready(Ok(AuthMiddlewareService {
      service: Rc::new(service),
      auth_service: self.auth_service.clone(),
    }))
  }
}

pub struct AuthMiddlewareService<S> {
  service: Rc<S>,
  auth_service: Arc<AuthService>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
  S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
  S::Future: 'static,
  B: 'static,
{
  type Response = ServiceResponse<EitherBody<B>>;
  type Error = Error;
  type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

  forward_ready!(service);

  fn call(&self, req: ServiceRequest) -> Self::Future {
    let service = Rc::clone(&self.service);

    let claims = extract_bearer_token(&req).and_then(|token| {
      self
        .auth_service
        .authenticate(token)
        .map_err(ApiError::from)
    });

    Box::pin(async move {
      let claims = match claims {
        Ok(claims) => claims,
        Err(e) => {
          let (request, _) = req.into_parts();
          let response = e.error_response().map_into_right_body();
          return Ok(ServiceResponse::new(request, response));
        }
      };

      req.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.user_id,
        email: claims.email,
      });

      let res = service.call(req).await?;
      Ok(res.map_into_left_body())
    })
  }
}

/// Extract access token from Authorization header
fn extract_bearer_token(req: &ServiceRequest) -> Result<&str, ApiError> {
  req
    .headers()
    .get("Authorization")
    .and_then(|h| h.to_str().ok())
    .and_then(|s| s.strip_prefix("Bearer "))
    .filter(|s| !s.is_empty())
    .ok_or(ApiError::Auth(AuthErrorKind::InvalidToken))
}

/// Handlers behind [`AuthMiddleware`] take `AuthenticatedUser` as an argument;
/// without the middleware the extractor answers 401
impl FromRequest for AuthenticatedUser {
  type Error = ApiError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
    ready(
      req
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .ok_or(ApiError::Auth(AuthErrorKind::InvalidToken)),
    )
  }
}
