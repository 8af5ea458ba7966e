use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::auth::{
  entities::User, errors::RepositoryError, ports::UserRepository, value_objects::Email,
};

/// PostgreSQL implementation of the UserRepository trait
pub struct PostgresUserRepository {
  pool: PgPool,
}

impl PostgresUserRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

/// Database row structure for users table
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
  id: Uuid,
  email: String,
  password_hash: String,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
  fn from(row: UserRow) -> Self {
    User::from_db(
      row.id,
      row.email,
      row.password_hash,
      row.created_at,
      row.updated_at,
    )
  }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
  async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(
      r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(User::from))
  }

  async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(
      r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE LOWER(email) = $1
            "#,
    )
    .bind(email.as_str())
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(User::from))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::infrastructure::persistence::postgres::test_support::setup_test_db;

  #[tokio::test]
  #[ignore = "requires a Docker daemon"]
  async fn test_find_by_email_is_case_insensitive() {
    let (pool, _container) = setup_test_db().await;
    let id = Uuid::new_v4();

    sqlx::query(
      r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, 'Mixed.Case@Example.com', 'hash')
            "#,
    )
    .bind(id)
    .execute(&pool)
    .await
    .expect("Failed to create test user");

    let repo = PostgresUserRepository::new(pool);

    let user = repo
      .find_by_email(&Email::new("mixed.case@example.com").unwrap())
      .await
      .unwrap()
      .expect("user should exist");
    assert_eq!(user.id, id);

    assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
  }
}
