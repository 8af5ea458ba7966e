use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::auth::{
  entities::User, errors::RepositoryError, ports::UserRepository, value_objects::Email,
};

/// User lookup over a concurrent map, seeded at startup
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
  users: DashMap<Uuid, User>,
}

impl InMemoryUserRepository {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, user: User) {
    self.users.insert(user.id, user);
  }

  pub fn remove(&self, id: Uuid) -> Option<User> {
    self.users.remove(&id).map(|(_, user)| user)
  }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
  async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
    Ok(self.users.get(&id).map(|user| user.value().clone()))
  }

  async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
    Ok(
      self
        .users
        .iter()
        .find(|user| user.email.eq_ignore_ascii_case(email.as_str()))
        .map(|user| user.value().clone()),
    )
  }
}
