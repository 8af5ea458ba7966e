use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessionguard::{
  adapters::http::{AuthRouteDependencies, configure_auth_routes, health_handler},
  application::auth::{
    LoginUserUseCase, LogoutAllDevicesUseCase, LogoutUserUseCase, RefreshSessionUseCase,
  },
  domain::auth::{
    lockout::LockoutTracker, ports::TtlStore, services::AuthService, token_service::TokenService,
  },
  domain::rate_limit::RateLimiter,
  infrastructure::{
    cache::{MemoryTtlStore, RedisTtlStore},
    config::{Config, RedisConfig, TtlStoreKind},
    persistence::postgres::{PostgresTokenStore, PostgresUserRepository},
    security::{Argon2PasswordHasher, JwtAccessTokenSigner, SecureTokenGenerator},
  },
};

const MEMORY_STORE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  // Initialize environment variables from .env file
  dotenvy::dotenv().ok();

  // Initialize tracing subscriber for logging
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sessionguard=debug,actix_web=info".into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  tracing::info!("Starting sessionguard");

  let config = Config::load().context("Failed to load configuration")?;
  tracing::info!("Configuration loaded successfully");

  // Set up database connection pool with timeout
  tracing::info!("Connecting to database");
  let db_pool = tokio::time::timeout(
    Duration::from_secs(config.database.connect_timeout_seconds),
    PgPoolOptions::new()
      .max_connections(config.database.max_connections)
      .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_seconds))
      .connect(&config.database.url),
  )
  .await
  .with_context(|| {
    format!(
      "Database connection timed out after {} seconds. Is PostgreSQL running?",
      config.database.connect_timeout_seconds
    )
  })?
  .context("Could not connect to database")?;
  tracing::info!("Database connection pool created");

  tracing::info!("Running database migrations");
  sqlx::migrate!("./migrations")
    .run(&db_pool)
    .await
    .context("Failed to run database migrations")?;
  tracing::info!("Database migrations completed");

  // Lockout counters and flags
  let ttl_store: Option<Arc<dyn TtlStore>> = match (config.lockout.store, &config.redis) {
    (TtlStoreKind::Disabled, _) => None,
    (TtlStoreKind::Redis, Some(redis)) => {
      let store: Arc<dyn TtlStore> = Arc::new(connect_redis(redis).await?);
      Some(store)
    }
    (TtlStoreKind::Redis, None) => {
      tracing::warn!("No Redis configured, lockout tracking is disabled");
      None
    }
    (TtlStoreKind::Memory, _) => {
      tracing::warn!("Using process-local lockout store, not shared between instances");
      let store = Arc::new(MemoryTtlStore::new());
      spawn_purge_task(store.clone());
      Some(store as Arc<dyn TtlStore>)
    }
  };

  let lockout = Arc::new(match ttl_store {
    Some(store) => LockoutTracker::new(store, config.lockout()),
    None => LockoutTracker::disabled(config.lockout()),
  });

  // Initialize repositories
  let user_repo = Arc::new(PostgresUserRepository::new(db_pool.clone()));
  let token_store = Arc::new(PostgresTokenStore::new(db_pool.clone()));

  // Initialize security services
  let password_hasher =
    Arc::new(Argon2PasswordHasher::new().context("Failed to create password hasher")?);
  let signer = Arc::new(
    JwtAccessTokenSigner::new(&config.tokens.jwt_secret, config.tokens.jwt_issuer.clone())
      .context("Invalid access token signing configuration")?,
  );
  let token_generator = Arc::new(SecureTokenGenerator::new());

  // Initialize domain services
  let token_service = Arc::new(TokenService::new(
    token_store,
    user_repo.clone(),
    signer,
    token_generator,
    config.token_service(),
  ));
  let auth_service = Arc::new(AuthService::new(
    user_repo,
    password_hasher,
    lockout,
    token_service,
  ));

  let rate_limit = &config.rate_limit;
  let idle_ttl = Duration::from_secs(rate_limit.idle_ttl_seconds);
  let login_limiter = Arc::new(RateLimiter::new(
    "login",
    rate_limit.login,
    rate_limit.max_keys,
    idle_ttl,
  ));
  let refresh_limiter = Arc::new(RateLimiter::new(
    "refresh",
    rate_limit.refresh,
    rate_limit.max_keys,
    idle_ttl,
  ));
  let api_limiter = Arc::new(RateLimiter::new(
    "api",
    rate_limit.api,
    rate_limit.max_keys,
    idle_ttl,
  ));

  // Initialize use cases
  let timeout = config.store.operation_timeout();
  let routes = AuthRouteDependencies {
    login_use_case: Arc::new(LoginUserUseCase::new(auth_service.clone(), timeout)),
    refresh_use_case: Arc::new(RefreshSessionUseCase::new(auth_service.clone(), timeout)),
    logout_use_case: Arc::new(LogoutUserUseCase::new(auth_service.clone(), timeout)),
    logout_all_use_case: Arc::new(LogoutAllDevicesUseCase::new(auth_service.clone(), timeout)),
    auth_service,
    login_limiter,
    refresh_limiter,
    api_limiter,
  };

  let server_host = config.server.host.clone();
  let server_port = config.server.port;

  tracing::info!("Starting HTTP server on {}:{}", server_host, server_port);

  HttpServer::new(move || {
    App::new()
      .wrap(Logger::default())
      .service(web::scope("/api/v1/auth").configure(|cfg| configure_auth_routes(cfg, routes.clone())))
      .route("/health", web::get().to(health_handler))
  })
  .bind((server_host.as_str(), server_port))?
  .run()
  .await?;

  Ok(())
}

async fn connect_redis(config: &RedisConfig) -> anyhow::Result<RedisTtlStore> {
  tracing::info!("Connecting to Redis");

  let client = redis::Client::open(config.url.clone()).context("Invalid Redis URL")?;
  let connection = tokio::time::timeout(
    Duration::from_secs(config.connect_timeout_seconds),
    client.get_connection_manager(),
  )
  .await
  .with_context(|| {
    format!(
      "Redis connection timed out after {} seconds. Is Redis running?",
      config.connect_timeout_seconds
    )
  })?
  .context("Could not connect to Redis")?;

  tracing::info!("Redis connection established");
  Ok(RedisTtlStore::new(connection, config.key_prefix.clone()))
}

/// Expired entries are otherwise only dropped when their key is read again
fn spawn_purge_task(store: Arc<MemoryTtlStore>) {
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(MEMORY_STORE_PURGE_INTERVAL);
    loop {
      interval.tick().await;
      let purged = store.purge_expired();
      if purged > 0 {
        tracing::debug!(purged, "Purged expired lockout entries");
      }
    }
  });
}
