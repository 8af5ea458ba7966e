use actix_web::{
  Error, ResponseError,
  body::EitherBody,
  dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
  http::header::{HeaderName, HeaderValue},
};
use futures_util::future::LocalBoxFuture;
use std::{
  future::{Ready, ready},
  rc::Rc,
  sync::Arc,
};

use crate::{
  adapters::http::errors::ApiError,
  domain::rate_limit::{RateLimitDecision, RateLimiter},
};

/// Admission control for one surface, keyed by client IP
///
/// Rejected requests get a 429 with `Retry-After` and never reach the
/// handler. Admitted responses carry the `X-RateLimit-*` headers as well.
pub struct RateLimitMiddleware {
  limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
  pub fn new(limiter: Arc<RateLimiter>) -> Self {
    Self { limiter }
  }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
  S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
  S::Future: 'static,
  B: 'static,
{
  type Response = ServiceResponse<EitherBody<B>>;
  type Error = Error;
  type Transform = RateLimitMiddlewareService<S>;
  type InitError = ();
  type Future = Ready<Result<Self::Transform, Self::InitError>>;

  fn new_transform(&self, service: S) -> Self::Future {
    ready(Ok(RateLimitMiddlewareService {
      service: Rc::new(service),
      limiter: self.limiter.clone(),
    }))
  }
}

pub struct RateLimitMiddlewareService<S> {
  service: Rc<S>,
  limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
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
    let key = client_key(&req);
    let outcome = self.limiter.check(&key).into_result();
    let surface = self.limiter.surface().to_string();

    Box::pin(async move {
      let decision = match outcome {
        Ok(decision) => decision,
        Err(error) => {
          tracing::warn!(
            surface = %surface,
            path = %req.path(),
            client = %key,
            error = %error,
            "Request rejected by rate limiter"
          );
          let (request, _) = req.into_parts();
          let response = ApiError::from(error)
            .error_response()
            .map_into_right_body();
          return Ok(ServiceResponse::new(request, response));
        }
      };

      let mut res = service.call(req).await?;
      insert_headers(&mut res, &decision);
      Ok(res.map_into_left_body())
    })
  }
}

/// Socket peer address; forwarding headers are client-controlled and ignored
fn client_key(req: &ServiceRequest) -> String {
  req
    .peer_addr()
    .map(|addr| addr.ip().to_string())
    .unwrap_or_else(|| "unknown".to_string())
}

fn insert_headers<B>(res: &mut ServiceResponse<B>, decision: &RateLimitDecision) {
  let headers = res.headers_mut();
  let values = [
    ("x-ratelimit-limit", i64::from(decision.limit)),
    ("x-ratelimit-remaining", i64::from(decision.remaining)),
    ("x-ratelimit-reset", decision.reset_at),
  ];

  for (name, value) in values {
    headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::rate_limit::RateLimitPolicy;
  use actix_web::{
    App, HttpResponse,
    http::StatusCode,
    test::{self, TestRequest},
    web,
  };
  use std::time::Duration;

  fn limiter(requests: u32) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(
      "test",
      RateLimitPolicy::new(requests, Duration::from_secs(60)),
      100,
      Duration::from_secs(60),
    ))
  }

  #[actix_web::test]
  async fn test_admitted_response_carries_headers() {
    let app = test::init_service(
      App::new()
        .wrap(RateLimitMiddleware::new(limiter(2)))
        .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;

    let resp = test::call_service(&app, TestRequest::get().uri("/").to_request()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-ratelimit-limit").unwrap(), "2");
    assert_eq!(resp.headers().get("x-ratelimit-remaining").unwrap(), "1");
    assert!(resp.headers().contains_key("x-ratelimit-reset"));
  }

  #[actix_web::test]
  async fn test_exhausted_bucket_rejects_with_retry_after() {
    let app = test::init_service(
      App::new()
        .wrap(RateLimitMiddleware::new(limiter(1)))
        .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;

    let first = test::call_service(&app, TestRequest::get().uri("/").to_request()).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = test::call_service(&app, TestRequest::get().uri("/").to_request()).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("retry-after"));
    assert_eq!(second.headers().get("x-ratelimit-remaining").unwrap(), "0");
  }

  #[actix_web::test]
  async fn test_clients_are_limited_separately() {
    let app = test::init_service(
      App::new()
        .wrap(RateLimitMiddleware::new(limiter(1)))
        .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;

    let from = |ip: &str| {
      TestRequest::get()
        .uri("/")
        .peer_addr(format!("{}:4000", ip).parse().unwrap())
        .to_request()
    };

    assert_eq!(
      test::call_service(&app, from("10.0.0.1")).await.status(),
      StatusCode::OK
    );
    assert_eq!(
      test::call_service(&app, from("10.0.0.2")).await.status(),
      StatusCode::OK
    );
    assert_eq!(
      test::call_service(&app, from("10.0.0.1")).await.status(),
      StatusCode::TOO_MANY_REQUESTS
    );
  }
}
