use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::entities::{RefreshTokenRecord, User};
use super::errors::{AuthError, RepositoryError};
use super::ports::{AccessTokenSigner, RotationUnit, TokenGenerator, TokenStore, UserRepository};
use super::retry::retry_once;
use super::value_objects::{
  AccessClaims, Deadline, FamilyId, IdentityClaims, RefreshToken, TokenHash, TokenPair,
};

/// Lifetimes and retry policy for issued credentials
#[derive(Debug, Clone)]
pub struct TokenServiceConfig {
  pub access_token_ttl: Duration,
  pub refresh_token_ttl: Duration,
  /// Pause before the single retry of a transient store failure
  pub retry_backoff: std::time::Duration,
}

impl Default for TokenServiceConfig {
  fn default() -> Self {
    Self {
      access_token_ttl: Duration::minutes(15),
      refresh_token_ttl: Duration::days(7),
      retry_backoff: std::time::Duration::from_millis(50),
    }
  }
}

/// Issues, rotates and revokes refresh tokens
///
/// Rotation follows the family model: every login starts a family, every
/// rotation extends it by one link, and presenting a token that was already
/// rotated away from (or revoked) kills the whole family.
///
/// The service fails closed: if the token store cannot be reached, nothing
/// is issued or rotated.
pub struct TokenService {
  store: Arc<dyn TokenStore>,
  users: Arc<dyn UserRepository>,
  signer: Arc<dyn AccessTokenSigner>,
  generator: Arc<dyn TokenGenerator>,
  config: TokenServiceConfig,
}

/// Why a single rotation attempt did not produce a pair
enum RotationFailure {
  /// Happened before commit, safe to try once more
  Transient(RepositoryError),
  Auth(AuthError),
}

impl RotationFailure {
  fn store(error: RepositoryError) -> Self {
    if error.is_transient() {
      RotationFailure::Transient(error)
    } else {
      RotationFailure::Auth(error.into())
    }
  }
}

impl From<AuthError> for RotationFailure {
  fn from(error: AuthError) -> Self {
    RotationFailure::Auth(error)
  }
}

impl From<RotationFailure> for AuthError {
  fn from(failure: RotationFailure) -> Self {
    match failure {
      RotationFailure::Transient(error) => error.into(),
      RotationFailure::Auth(error) => error,
    }
  }
}

enum Compromise {
  /// A revoked or superseded token was presented again
  Reuse,
  /// The family's owner no longer exists
  UnknownOwner,
}

/// Outcome of the in-transaction part of a rotation, before commit
enum Prepared {
  Rotated {
    unit: Box<dyn RotationUnit>,
    pair: TokenPair,
    parent: RefreshTokenRecord,
  },
  Compromised {
    unit: Box<dyn RotationUnit>,
    record: RefreshTokenRecord,
    compromise: Compromise,
  },
  /// The store refused a second unrevoked record in the family
  Branched { record: RefreshTokenRecord },
}

impl TokenService {
  pub fn new(
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserRepository>,
    signer: Arc<dyn AccessTokenSigner>,
    generator: Arc<dyn TokenGenerator>,
    config: TokenServiceConfig,
  ) -> Self {
    Self {
      store,
      users,
      signer,
      generator,
      config,
    }
  }

  /// Starts a new family for `user_id` and returns its first pair
  pub async fn issue_pair(
    &self,
    user_id: Uuid,
    claims: &IdentityClaims,
    deadline: &Deadline,
  ) -> Result<TokenPair, AuthError> {
    let refresh_token = self.new_refresh_token()?;
    let record =
      RefreshTokenRecord::issue(refresh_token.hash(), user_id, self.config.refresh_token_ttl);
    let family_id = record.family_id;
    let access = self
      .signer
      .sign(user_id, claims, self.config.access_token_ttl)?;

    let store = &self.store;
    deadline
      .run(retry_once(
        self.config.retry_backoff,
        "token_store.insert",
        move || store.insert(record.clone()),
      ))
      .await??;

    tracing::info!(user_id = %user_id, family_id = %family_id, "Issued new token family");

    Ok(TokenPair {
      access_token: access.token,
      refresh_token,
      expires_in: access.expires_in,
    })
  }

  /// Exchanges a refresh token for a new pair
  ///
  /// # Errors
  /// - `InvalidToken` if the token is unknown or its owner no longer exists
  /// - `ExpiredToken` if the token is past its expiry
  /// - `TokenReuseDetected` if the token was already rotated or revoked; the
  ///   whole family is revoked before this is returned
  /// - `Timeout` / `Cancelled` if the deadline fired before commit; nothing
  ///   was written and the presented token is still usable
  pub async fn rotate(
    &self,
    presented: &RefreshToken,
    deadline: &Deadline,
  ) -> Result<TokenPair, AuthError> {
    let token_hash = presented.hash();

    match self.rotate_attempt(&token_hash, deadline).await {
      Err(RotationFailure::Transient(error)) => {
        tracing::warn!(error = %error, "Transient failure during rotation, retrying once");
        deadline
          .run(tokio::time::sleep(self.config.retry_backoff))
          .await?;
        Ok(self.rotate_attempt(&token_hash, deadline).await?)
      }
      outcome => Ok(outcome?),
    }
  }

  async fn rotate_attempt(
    &self,
    token_hash: &TokenHash,
    deadline: &Deadline,
  ) -> Result<TokenPair, RotationFailure> {
    let now = Utc::now();
    let prepared = deadline
      .run(self.prepare_rotation(token_hash, now))
      .await
      .map_err(AuthError::from)??;

    match prepared {
      Prepared::Rotated { unit, pair, parent } => {
        // Commit is the linearization point. Interrupting before it leaves
        // the presented token untouched; once started it runs to completion.
        deadline.check().map_err(AuthError::from)?;
        unit
          .commit()
          .await
          .map_err(|error| RotationFailure::Auth(error.into()))?;

        tracing::debug!(
          user_id = %parent.user_id,
          family_id = %parent.family_id,
          "Rotated refresh token"
        );
        Ok(pair)
      }
      Prepared::Compromised {
        unit,
        record,
        compromise,
      } => {
        unit
          .commit()
          .await
          .map_err(|error| RotationFailure::Auth(error.into()))?;

        match compromise {
          Compromise::Reuse => {
            tracing::warn!(
              user_id = %record.user_id,
              family_id = %record.family_id,
              token_id = %record.id,
              "Refresh token reuse detected, revoked entire family"
            );
            Err(AuthError::TokenReuseDetected.into())
          }
          Compromise::UnknownOwner => {
            tracing::warn!(
              user_id = %record.user_id,
              family_id = %record.family_id,
              "Refresh token owner no longer exists, revoked family"
            );
            Err(AuthError::InvalidToken.into())
          }
        }
      }
      Prepared::Branched { record } => {
        self.revoke_family(record.family_id, now).await?;
        tracing::warn!(
          user_id = %record.user_id,
          family_id = %record.family_id,
          "Concurrent rotation would branch the family, revoked entire family"
        );
        Err(AuthError::TokenReuseDetected.into())
      }
    }
  }

  /// Read-check-mutate-insert inside one unit of work
  async fn prepare_rotation(
    &self,
    token_hash: &TokenHash,
    now: DateTime<Utc>,
  ) -> Result<Prepared, RotationFailure> {
    // Resolved before the unit opens; an open unit pins one store connection
    let owner = self.resolve_owner(token_hash).await?;

    let mut unit = self.store.begin().await.map_err(RotationFailure::store)?;

    let record = unit
      .find_for_update(token_hash)
      .await
      .map_err(RotationFailure::store)?
      .ok_or(AuthError::InvalidToken)?;

    if record.is_expired_at(now) {
      return Err(AuthError::ExpiredToken.into());
    }

    if record.is_revoked() || record.is_superseded() {
      unit
        .revoke_family(record.family_id, now)
        .await
        .map_err(RotationFailure::store)?;
      return Ok(Prepared::Compromised {
        unit,
        record,
        compromise: Compromise::Reuse,
      });
    }

    let Some(user) = owner.filter(|user| user.id == record.user_id) else {
      unit
        .revoke_family(record.family_id, now)
        .await
        .map_err(RotationFailure::store)?;
      return Ok(Prepared::Compromised {
        unit,
        record,
        compromise: Compromise::UnknownOwner,
      });
    };

    let refresh_token = self.new_refresh_token()?;
    let successor = record.successor(refresh_token.hash(), self.config.refresh_token_ttl);

    let won = unit
      .mark_revoked_and_link(token_hash, successor.id, now)
      .await
      .map_err(RotationFailure::store)?;
    if !won {
      unit
        .revoke_family(record.family_id, now)
        .await
        .map_err(RotationFailure::store)?;
      return Ok(Prepared::Compromised {
        unit,
        record,
        compromise: Compromise::Reuse,
      });
    }

    match unit.insert(successor).await {
      Ok(()) => {}
      Err(RepositoryError::DuplicateKey(detail)) => {
        tracing::debug!(detail = %detail, "Successor insert rejected");
        return Ok(Prepared::Branched { record });
      }
      Err(error) => return Err(RotationFailure::store(error)),
    }

    let access = self.signer.sign(
      user.id,
      &user.identity_claims(),
      self.config.access_token_ttl,
    )?;

    Ok(Prepared::Rotated {
      unit,
      pair: TokenPair {
        access_token: access.token,
        refresh_token,
        expires_in: access.expires_in,
      },
      parent: record,
    })
  }

  async fn resolve_owner(&self, token_hash: &TokenHash) -> Result<Option<User>, RotationFailure> {
    let record = self
      .store
      .find_by_identity(token_hash)
      .await
      .map_err(RotationFailure::store)?
      .ok_or(AuthError::InvalidToken)?;

    self
      .users
      .find_by_id(record.user_id)
      .await
      .map_err(RotationFailure::store)
  }

  /// Single-session logout
  pub async fn revoke(&self, token: &RefreshToken, deadline: &Deadline) -> Result<(), AuthError> {
    let token_hash = token.hash();
    let now = Utc::now();
    let store = &self.store;
    let hash = &token_hash;

    let revoked = deadline
      .run(retry_once(
        self.config.retry_backoff,
        "token_store.revoke",
        move || store.revoke(hash, now),
      ))
      .await??;

    if revoked {
      tracing::info!("Revoked refresh token");
      return Ok(());
    }

    // Nothing changed: either unknown or already revoked
    match self.find(&token_hash, deadline).await? {
      Some(_) => Err(AuthError::TokenRevoked),
      None => Err(AuthError::InvalidToken),
    }
  }

  /// Logout that first proves `user_id` owns the token
  pub async fn revoke_for_user(
    &self,
    user_id: Uuid,
    token: &RefreshToken,
    deadline: &Deadline,
  ) -> Result<(), AuthError> {
    let token_hash = token.hash();
    let record = self
      .find(&token_hash, deadline)
      .await?
      .ok_or(AuthError::InvalidToken)?;

    if record.user_id != user_id {
      tracing::warn!(
        requested_by = %user_id,
        owner = %record.user_id,
        family_id = %record.family_id,
        "Refresh token ownership mismatch on revoke"
      );
      return Err(AuthError::TokenOwnershipMismatch);
    }

    if record.is_revoked() {
      return Err(AuthError::TokenRevoked);
    }

    self.revoke(token, deadline).await
  }

  /// Revokes every active token of the user across all families
  pub async fn revoke_all_for_user(
    &self,
    user_id: Uuid,
    deadline: &Deadline,
  ) -> Result<u64, AuthError> {
    let now = Utc::now();
    let store = &self.store;

    let revoked = deadline
      .run(retry_once(
        self.config.retry_backoff,
        "token_store.revoke_all_for_user",
        move || store.revoke_all_for_user(user_id, now),
      ))
      .await??;

    tracing::info!(user_id = %user_id, revoked, "Revoked all refresh tokens for user");
    Ok(revoked)
  }

  /// Verifies an access credential produced by this service
  pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
    self.signer.verify(access_token)
  }

  async fn find(
    &self,
    token_hash: &TokenHash,
    deadline: &Deadline,
  ) -> Result<Option<RefreshTokenRecord>, AuthError> {
    let store = &self.store;

    Ok(
      deadline
        .run(retry_once(
          self.config.retry_backoff,
          "token_store.find_by_identity",
          move || store.find_by_identity(token_hash),
        ))
        .await??,
    )
  }

  async fn revoke_family(&self, family_id: FamilyId, at: DateTime<Utc>) -> Result<u64, AuthError> {
    let store = &self.store;

    Ok(
      retry_once(
        self.config.retry_backoff,
        "token_store.revoke_family",
        move || store.revoke_family(family_id, at),
      )
      .await?,
    )
  }

  fn new_refresh_token(&self) -> Result<RefreshToken, AuthError> {
    let raw = self.generator.generate()?;
    Ok(RefreshToken::from_string(raw)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::auth::entities::User;
  use crate::infrastructure::persistence::memory::{InMemoryTokenStore, InMemoryUserRepository};
  use crate::infrastructure::security::{JwtAccessTokenSigner, SecureTokenGenerator};
  use futures_util::future::join_all;

  const SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";

  struct Fixture {
    service: Arc<TokenService>,
    store: InMemoryTokenStore,
    user: User,
  }

  fn fixture() -> Fixture {
    let store = InMemoryTokenStore::new();
    let users = InMemoryUserRepository::new();
    let user = User::new("a@b.com".to_string(), "unused".to_string());
    users.insert(user.clone());

    let service = TokenService::new(
      Arc::new(store.clone()),
      Arc::new(users),
      Arc::new(JwtAccessTokenSigner::new(SECRET, "sessionguard-test").unwrap()),
      Arc::new(SecureTokenGenerator::new()),
      TokenServiceConfig::default(),
    );

    Fixture {
      service: Arc::new(service),
      store,
      user,
    }
  }

  async fn login(fixture: &Fixture) -> TokenPair {
    fixture
      .service
      .issue_pair(
        fixture.user.id,
        &fixture.user.identity_claims(),
        &Deadline::none(),
      )
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_issue_pair_creates_first_record() {
    let fixture = fixture();
    let pair = login(&fixture).await;

    let record = fixture
      .store
      .find_by_identity(&pair.refresh_token.hash())
      .await
      .unwrap()
      .unwrap();

    assert_eq!(record.user_id, fixture.user.id);
    assert!(record.replaced_by.is_none());
    assert!(record.revoked_at.is_none());
    assert_eq!(pair.expires_in, 15 * 60);

    let claims = fixture.service.authenticate(&pair.access_token).unwrap();
    assert_eq!(claims.user_id, fixture.user.id);
    assert_eq!(claims.email, "a@b.com");
  }

  #[tokio::test]
  async fn test_rotate_returns_new_token_and_invalidates_input() {
    let fixture = fixture();
    let first = login(&fixture).await;

    let second = fixture
      .service
      .rotate(&first.refresh_token, &Deadline::none())
      .await
      .unwrap();

    assert_ne!(second.refresh_token, first.refresh_token);

    let parent = fixture
      .store
      .find_by_identity(&first.refresh_token.hash())
      .await
      .unwrap()
      .unwrap();
    let child = fixture
      .store
      .find_by_identity(&second.refresh_token.hash())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(parent.replaced_by, Some(child.id));
    assert_eq!(parent.family_id, child.family_id);

    let replay = fixture
      .service
      .rotate(&first.refresh_token, &Deadline::none())
      .await;
    assert!(matches!(replay, Err(AuthError::TokenReuseDetected)));
  }

  #[tokio::test]
  async fn test_reuse_revokes_whole_family_including_newest() {
    let fixture = fixture();
    let first = login(&fixture).await;
    let second = fixture
      .service
      .rotate(&first.refresh_token, &Deadline::none())
      .await
      .unwrap();
    let third = fixture
      .service
      .rotate(&second.refresh_token, &Deadline::none())
      .await
      .unwrap();

    let reuse = fixture
      .service
      .rotate(&first.refresh_token, &Deadline::none())
      .await;
    assert!(matches!(reuse, Err(AuthError::TokenReuseDetected)));

    let family = fixture
      .store
      .find_by_identity(&third.refresh_token.hash())
      .await
      .unwrap()
      .unwrap()
      .family_id;
    let records = fixture.store.family(family).await;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(RefreshTokenRecord::is_revoked));

    let newest = fixture
      .service
      .rotate(&third.refresh_token, &Deadline::none())
      .await;
    assert!(matches!(newest, Err(AuthError::TokenReuseDetected)));
  }

  #[tokio::test]
  async fn test_reuse_leaves_other_families_alone() {
    let fixture = fixture();
    let laptop = login(&fixture).await;
    let phone = login(&fixture).await;

    fixture
      .service
      .rotate(&laptop.refresh_token, &Deadline::none())
      .await
      .unwrap();
    let _ = fixture
      .service
      .rotate(&laptop.refresh_token, &Deadline::none())
      .await;

    assert!(
      fixture
        .service
        .rotate(&phone.refresh_token, &Deadline::none())
        .await
        .is_ok()
    );
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_rotation_has_exactly_one_winner() {
    let fixture = fixture();
    let pair = login(&fixture).await;

    let attempts = (0..16).map(|_| {
      let service = Arc::clone(&fixture.service);
      let token = pair.refresh_token.clone();
      tokio::spawn(async move { service.rotate(&token, &Deadline::none()).await })
    });

    let outcomes: Vec<_> = join_all(attempts)
      .await
      .into_iter()
      .map(|joined| joined.unwrap())
      .collect();

    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let rejected = outcomes
      .iter()
      .filter(|outcome| {
        matches!(
          outcome,
          Err(AuthError::TokenReuseDetected) | Err(AuthError::TokenRevoked)
        )
      })
      .count();

    assert_eq!(winners, 1);
    assert_eq!(rejected, 15);
  }

  /// Looks users up through the token store, so a lookup made while a
  /// rotation unit holds the store can never complete
  struct SharedStoreUsers {
    store: InMemoryTokenStore,
    users: InMemoryUserRepository,
    lookup_key: TokenHash,
  }

  #[async_trait::async_trait]
  impl UserRepository for SharedStoreUsers {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
      self.store.find_by_identity(&self.lookup_key).await?;
      self.users.find_by_id(id).await
    }

    async fn find_by_email(
      &self,
      email: &crate::domain::auth::value_objects::Email,
    ) -> Result<Option<User>, RepositoryError> {
      self.users.find_by_email(email).await
    }
  }

  #[tokio::test]
  async fn test_owner_lookup_does_not_wait_on_open_unit() {
    let store = InMemoryTokenStore::new();
    let users = InMemoryUserRepository::new();
    let user = User::new("a@b.com".to_string(), "unused".to_string());
    users.insert(user.clone());

    let service = TokenService::new(
      Arc::new(store.clone()),
      Arc::new(SharedStoreUsers {
        store: store.clone(),
        users,
        lookup_key: TokenHash::from_hash("0".repeat(64)).unwrap(),
      }),
      Arc::new(JwtAccessTokenSigner::new(SECRET, "sessionguard-test").unwrap()),
      Arc::new(SecureTokenGenerator::new()),
      TokenServiceConfig::default(),
    );

    let pair = service
      .issue_pair(user.id, &user.identity_claims(), &Deadline::none())
      .await
      .unwrap();

    let rotated = service
      .rotate(
        &pair.refresh_token,
        &Deadline::after(std::time::Duration::from_secs(2)),
      )
      .await;
    assert!(rotated.is_ok(), "rotation failed: {:?}", rotated.err());
  }

  #[tokio::test]
  async fn test_unknown_token_is_invalid() {
    let fixture = fixture();
    let stranger =
      RefreshToken::from_string(SecureTokenGenerator::new().generate().unwrap()).unwrap();

    let result = fixture.service.rotate(&stranger, &Deadline::none()).await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));
  }

  #[tokio::test]
  async fn test_expired_token_is_rejected_without_revoking_family() {
    let fixture = fixture();
    let token =
      RefreshToken::from_string(SecureTokenGenerator::new().generate().unwrap()).unwrap();
    let record =
      RefreshTokenRecord::issue(token.hash(), fixture.user.id, Duration::seconds(-1));
    let family = record.family_id;
    fixture.store.insert(record).await.unwrap();

    let result = fixture.service.rotate(&token, &Deadline::none()).await;

    assert!(matches!(result, Err(AuthError::ExpiredToken)));
    assert!(
      fixture
        .store
        .family(family)
        .await
        .iter()
        .all(|record| !record.is_revoked())
    );
  }

  #[tokio::test]
  async fn test_deleted_owner_invalidates_family() {
    let fixture = fixture();
    let token =
      RefreshToken::from_string(SecureTokenGenerator::new().generate().unwrap()).unwrap();
    let record = RefreshTokenRecord::issue(token.hash(), Uuid::new_v4(), Duration::days(1));
    let family = record.family_id;
    fixture.store.insert(record).await.unwrap();

    let result = fixture.service.rotate(&token, &Deadline::none()).await;

    assert!(matches!(result, Err(AuthError::InvalidToken)));
    assert!(
      fixture
        .store
        .family(family)
        .await
        .iter()
        .all(RefreshTokenRecord::is_revoked)
    );
  }

  #[tokio::test]
  async fn test_rotation_after_deadline_leaves_token_usable() {
    let fixture = fixture();
    let pair = login(&fixture).await;
    let expired = Deadline::after(std::time::Duration::ZERO);

    let result = fixture.service.rotate(&pair.refresh_token, &expired).await;
    assert!(matches!(result, Err(AuthError::Timeout)));

    let retry = fixture
      .service
      .rotate(&pair.refresh_token, &Deadline::none())
      .await;
    assert!(retry.is_ok());
  }

  #[tokio::test]
  async fn test_revoke_then_rotate_is_reuse() {
    let fixture = fixture();
    let pair = login(&fixture).await;

    fixture
      .service
      .revoke(&pair.refresh_token, &Deadline::none())
      .await
      .unwrap();

    let again = fixture
      .service
      .revoke(&pair.refresh_token, &Deadline::none())
      .await;
    assert!(matches!(again, Err(AuthError::TokenRevoked)));

    let rotate = fixture
      .service
      .rotate(&pair.refresh_token, &Deadline::none())
      .await;
    assert!(matches!(rotate, Err(AuthError::TokenReuseDetected)));
  }

  #[tokio::test]
  async fn test_revoke_for_user_checks_ownership() {
    let fixture = fixture();
    let pair = login(&fixture).await;

    let mismatch = fixture
      .service
      .revoke_for_user(Uuid::new_v4(), &pair.refresh_token, &Deadline::none())
      .await;
    assert!(matches!(mismatch, Err(AuthError::TokenOwnershipMismatch)));

    fixture
      .service
      .revoke_for_user(fixture.user.id, &pair.refresh_token, &Deadline::none())
      .await
      .unwrap();

    let record = fixture
      .store
      .find_by_identity(&pair.refresh_token.hash())
      .await
      .unwrap()
      .unwrap();
    assert!(record.is_revoked());
    assert!(record.replaced_by.is_none());
  }

  #[tokio::test]
  async fn test_revoke_all_for_user_spans_families() {
    let fixture = fixture();
    let laptop = login(&fixture).await;
    let phone = login(&fixture).await;

    let revoked = fixture
      .service
      .revoke_all_for_user(fixture.user.id, &Deadline::none())
      .await
      .unwrap();
    assert_eq!(revoked, 2);

    for pair in [laptop, phone] {
      let result = fixture
        .service
        .rotate(&pair.refresh_token, &Deadline::none())
        .await;
      assert!(matches!(result, Err(AuthError::TokenReuseDetected)));
    }
  }
}
