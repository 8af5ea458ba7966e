use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::auth::entities::RefreshTokenRecord;
use crate::domain::auth::errors::RepositoryError;
use crate::domain::auth::ports::{RotationUnit, TokenStore};
use crate::domain::auth::value_objects::{FamilyId, TokenHash};

/// Database row structure for refresh_tokens table
#[derive(Debug, FromRow)]
struct RefreshTokenRow {
  id: Uuid,
  token_hash: String,
  family_id: Uuid,
  user_id: Uuid,
  issued_at: DateTime<Utc>,
  expires_at: DateTime<Utc>,
  revoked_at: Option<DateTime<Utc>>,
  replaced_by: Option<Uuid>,
}

impl TryFrom<RefreshTokenRow> for RefreshTokenRecord {
  type Error = RepositoryError;

  fn try_from(row: RefreshTokenRow) -> Result<Self, Self::Error> {
    let token_hash = TokenHash::from_hash(row.token_hash)
      .map_err(|e| RepositoryError::DatabaseError(format!("Corrupt token hash: {}", e)))?;

    Ok(RefreshTokenRecord::from_db(
      row.id,
      token_hash,
      FamilyId::from_uuid(row.family_id),
      row.user_id,
      row.issued_at,
      row.expires_at,
      row.revoked_at,
      row.replaced_by,
    ))
  }
}

const SELECT_COLUMNS: &str = r#"
            SELECT id, token_hash, family_id, user_id, issued_at, expires_at, revoked_at, replaced_by
            FROM refresh_tokens
            WHERE token_hash = $1
"#;

const INSERT: &str = r#"
            INSERT INTO refresh_tokens (id, token_hash, family_id, user_id, issued_at, expires_at, revoked_at, replaced_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

const REVOKE_FAMILY: &str = r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE family_id = $1 AND revoked_at IS NULL
"#;

fn insert_query(
  record: &RefreshTokenRecord,
) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
  sqlx::query(INSERT)
    .bind(record.id)
    .bind(record.token_hash.as_str())
    .bind(record.family_id.into_inner())
    .bind(record.user_id)
    .bind(record.issued_at)
    .bind(record.expires_at)
    .bind(record.revoked_at)
    .bind(record.replaced_by)
}

/// PostgreSQL token store
///
/// A partial unique index keeps at most one unrevoked record per family.
/// Rotation locks the presented row with `SELECT ... FOR UPDATE`, so
/// concurrent rotations of one token queue behind each other and every
/// loser observes the winner's committed state.
pub struct PostgresTokenStore {
  pool: PgPool,
}

impl PostgresTokenStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl TokenStore for PostgresTokenStore {
  async fn insert(&self, record: RefreshTokenRecord) -> Result<(), RepositoryError> {
    insert_query(&record).execute(&self.pool).await?;
    Ok(())
  }

  async fn find_by_identity(
    &self,
    token_hash: &TokenHash,
  ) -> Result<Option<RefreshTokenRecord>, RepositoryError> {
    sqlx::query_as::<_, RefreshTokenRow>(SELECT_COLUMNS)
      .bind(token_hash.as_str())
      .fetch_optional(&self.pool)
      .await?
      .map(RefreshTokenRecord::try_from)
      .transpose()
  }

  async fn revoke_family(
    &self,
    family_id: FamilyId,
    at: DateTime<Utc>,
  ) -> Result<u64, RepositoryError> {
    let result = sqlx::query(REVOKE_FAMILY)
      .bind(family_id.into_inner())
      .bind(at)
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected())
  }

  async fn revoke(&self, token_hash: &TokenHash, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
      r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
    )
    .bind(token_hash.as_str())
    .bind(at)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() == 1)
  }

  async fn revoke_all_for_user(
    &self,
    user_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
      r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
    )
    .bind(user_id)
    .bind(at)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected())
  }

  async fn begin(&self) -> Result<Box<dyn RotationUnit>, RepositoryError> {
    let tx = self.pool.begin().await?;
    Ok(Box::new(PostgresRotationUnit { tx }))
  }
}

/// Rotation unit over one database transaction
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PostgresRotationUnit {
  tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RotationUnit for PostgresRotationUnit {
  async fn find_for_update(
    &mut self,
    token_hash: &TokenHash,
  ) -> Result<Option<RefreshTokenRecord>, RepositoryError> {
    let query = format!("{} FOR UPDATE", SELECT_COLUMNS.trim_end());

    sqlx::query_as::<_, RefreshTokenRow>(&query)
      .bind(token_hash.as_str())
      .fetch_optional(&mut *self.tx)
      .await?
      .map(RefreshTokenRecord::try_from)
      .transpose()
  }

  async fn mark_revoked_and_link(
    &mut self,
    token_hash: &TokenHash,
    successor: Uuid,
    at: DateTime<Utc>,
  ) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
      r#"
            UPDATE refresh_tokens
            SET revoked_at = $3, replaced_by = $2
            WHERE token_hash = $1 AND revoked_at IS NULL AND replaced_by IS NULL
            "#,
    )
    .bind(token_hash.as_str())
    .bind(successor)
    .bind(at)
    .execute(&mut *self.tx)
    .await?;

    Ok(result.rows_affected() == 1)
  }

  async fn insert(&mut self, record: RefreshTokenRecord) -> Result<(), RepositoryError> {
    insert_query(&record).execute(&mut *self.tx).await?;
    Ok(())
  }

  async fn revoke_family(
    &mut self,
    family_id: FamilyId,
    at: DateTime<Utc>,
  ) -> Result<u64, RepositoryError> {
    let result = sqlx::query(REVOKE_FAMILY)
      .bind(family_id.into_inner())
      .bind(at)
      .execute(&mut *self.tx)
      .await?;

    Ok(result.rows_affected())
  }

  async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
    self.tx.commit().await.map_err(|e| {
      tracing::error!(error = %e, "Failed to commit rotation");
      RepositoryError::TransactionFailed(e.to_string())
    })
  }
}
