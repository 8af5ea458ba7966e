use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::auth::entities::RefreshTokenRecord;
use crate::domain::auth::errors::RepositoryError;
use crate::domain::auth::ports::{RotationUnit, TokenStore};
use crate::domain::auth::value_objects::{FamilyId, TokenHash};

type TokenTable = HashMap<TokenHash, RefreshTokenRecord>;

/// Token store for a single process
///
/// Enforces the same constraints as the relational schema: unique token
/// hashes and at most one unrevoked record per family. A rotation unit holds
/// the table lock from `begin` until it is committed or dropped, which
/// serializes rotations the way row locks do in the database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenStore {
  table: Arc<Mutex<TokenTable>>,
}

impl InMemoryTokenStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every record of a family, in issue order
  pub async fn family(&self, family_id: FamilyId) -> Vec<RefreshTokenRecord> {
    let table = self.table.lock().await;
    let mut records: Vec<_> = table
      .values()
      .filter(|record| record.family_id == family_id)
      .cloned()
      .collect();
    records.sort_by_key(|record| record.issued_at);
    records
  }

  pub async fn len(&self) -> usize {
    self.table.lock().await.len()
  }
}

fn check_insert(
  record: &RefreshTokenRecord,
  existing: &mut dyn Iterator<Item = &RefreshTokenRecord>,
) -> Result<(), RepositoryError> {
  for other in existing {
    if other.token_hash == record.token_hash {
      return Err(RepositoryError::DuplicateKey("token_hash".to_string()));
    }
    if record.revoked_at.is_none()
      && other.family_id == record.family_id
      && other.revoked_at.is_none()
    {
      return Err(RepositoryError::DuplicateKey(
        "one active record per family".to_string(),
      ));
    }
  }
  Ok(())
}

fn revoke_matching(
  table: &mut TokenTable,
  at: DateTime<Utc>,
  matches: impl Fn(&RefreshTokenRecord) -> bool,
) -> u64 {
  let mut revoked = 0;
  for record in table.values_mut() {
    if record.revoked_at.is_none() && matches(record) {
      record.revoke(at);
      revoked += 1;
    }
  }
  revoked
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
  async fn insert(&self, record: RefreshTokenRecord) -> Result<(), RepositoryError> {
    let mut table = self.table.lock().await;
    check_insert(&record, &mut table.values())?;
    table.insert(record.token_hash.clone(), record);
    Ok(())
  }

  async fn find_by_identity(
    &self,
    token_hash: &TokenHash,
  ) -> Result<Option<RefreshTokenRecord>, RepositoryError> {
    Ok(self.table.lock().await.get(token_hash).cloned())
  }

  async fn revoke_family(
    &self,
    family_id: FamilyId,
    at: DateTime<Utc>,
  ) -> Result<u64, RepositoryError> {
    let mut table = self.table.lock().await;
    Ok(revoke_matching(&mut table, at, |record| {
      record.family_id == family_id
    }))
  }

  async fn revoke(&self, token_hash: &TokenHash, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
    let mut table = self.table.lock().await;
    match table.get_mut(token_hash) {
      Some(record) if record.revoked_at.is_none() => {
        record.revoke(at);
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn revoke_all_for_user(
    &self,
    user_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<u64, RepositoryError> {
    let mut table = self.table.lock().await;
    Ok(revoke_matching(&mut table, at, |record| {
      record.user_id == user_id
    }))
  }

  async fn begin(&self) -> Result<Box<dyn RotationUnit>, RepositoryError> {
    let guard = Arc::clone(&self.table).lock_owned().await;
    Ok(Box::new(InMemoryRotationUnit {
      guard,
      staged: HashMap::new(),
    }))
  }
}

/// Writes are staged and applied to the table only on commit
pub struct InMemoryRotationUnit {
  guard: OwnedMutexGuard<TokenTable>,
  staged: TokenTable,
}

impl InMemoryRotationUnit {
  fn current(&self, token_hash: &TokenHash) -> Option<&RefreshTokenRecord> {
    self
      .staged
      .get(token_hash)
      .or_else(|| self.guard.get(token_hash))
  }

  fn stage_family_revocation(&mut self, family_id: FamilyId, at: DateTime<Utc>) -> u64 {
    let members: Vec<RefreshTokenRecord> = self
      .guard
      .values()
      .filter(|record| record.family_id == family_id)
      .filter(|record| !self.staged.contains_key(&record.token_hash))
      .chain(
        self
          .staged
          .values()
          .filter(|record| record.family_id == family_id),
      )
      .filter(|record| record.revoked_at.is_none())
      .cloned()
      .collect();

    let revoked = members.len() as u64;
    for mut record in members {
      record.revoke(at);
      self.staged.insert(record.token_hash.clone(), record);
    }
    revoked
  }
}

#[async_trait]
impl RotationUnit for InMemoryRotationUnit {
  async fn find_for_update(
    &mut self,
    token_hash: &TokenHash,
  ) -> Result<Option<RefreshTokenRecord>, RepositoryError> {
    Ok(self.current(token_hash).cloned())
  }

  async fn mark_revoked_and_link(
    &mut self,
    token_hash: &TokenHash,
    successor: Uuid,
    at: DateTime<Utc>,
  ) -> Result<bool, RepositoryError> {
    let Some(mut record) = self.current(token_hash).cloned() else {
      return Ok(false);
    };
    if record.is_revoked() || record.is_superseded() {
      return Ok(false);
    }

    record.link_successor(successor, at);
    self.staged.insert(token_hash.clone(), record);
    Ok(true)
  }

  async fn insert(&mut self, record: RefreshTokenRecord) -> Result<(), RepositoryError> {
    let staged = &self.staged;
    let mut merged = self
      .guard
      .values()
      .filter(|existing| !staged.contains_key(&existing.token_hash))
      .chain(staged.values());
    check_insert(&record, &mut merged)?;

    self.staged.insert(record.token_hash.clone(), record);
    Ok(())
  }

  async fn revoke_family(
    &mut self,
    family_id: FamilyId,
    at: DateTime<Utc>,
  ) -> Result<u64, RepositoryError> {
    Ok(self.stage_family_revocation(family_id, at))
  }

  async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
    let InMemoryRotationUnit { mut guard, staged } = *self;
    guard.extend(staged);
    Ok(())
  }
}
