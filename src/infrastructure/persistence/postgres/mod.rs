pub mod refresh_token_repository;
pub mod user_repository;

pub use refresh_token_repository::PostgresTokenStore;
pub use user_repository::PostgresUserRepository;

#[cfg(test)]
pub(crate) mod test_support {
  use sqlx::PgPool;
  use sqlx::postgres::PgPoolOptions;
  use testcontainers::ImageExt;
  use testcontainers_modules::postgres::Postgres;
  use testcontainers_modules::testcontainers::{ContainerAsync, runners::AsyncRunner};

  pub async fn setup_test_db() -> (PgPool, ContainerAsync<Postgres>) {
    setup_test_db_with_pool_size(10).await
  }

  pub async fn setup_test_db_with_pool_size(
    max_connections: u32,
  ) -> (PgPool, ContainerAsync<Postgres>) {
    let container = Postgres::default()
      .with_tag("16-alpine")
      .start()
      .await
      .expect("Failed to start postgres container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
      .get_host_port_ipv4(5432)
      .await
      .expect("Failed to get port");
    let database_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .connect(&database_url)
      .await
      .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
      .run(&pool)
      .await
      .expect("Failed to run migrations");

    (pool, container)
  }
}
