use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use crate::domain::auth::errors::StoreError;
use crate::domain::auth::ports::TtlStore;

#[derive(Debug, Clone)]
struct StoredValue {
  value: String,
  expires_at: Option<Instant>,
}

impl StoredValue {
  fn is_expired(&self, now: Instant) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

/// In-process TTL store
///
/// Expired entries are treated as absent on access and dropped by
/// [`MemoryTtlStore::purge_expired`]. Each key's read-modify-write happens
/// under its shard lock, so increments are atomic within the process.
#[derive(Debug, Default)]
pub struct MemoryTtlStore {
  entries: DashMap<String, StoredValue>,
}

impl MemoryTtlStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drops every expired entry; returns how many were removed
  pub fn purge_expired(&self) -> usize {
    let now = Instant::now();
    let before = self.entries.len();
    self.entries.retain(|_, stored| !stored.is_expired(now));
    before.saturating_sub(self.entries.len())
  }

  /// Live keys, mostly useful for diagnostics
  pub fn keys(&self) -> Vec<String> {
    let now = Instant::now();
    self
      .entries
      .iter()
      .filter(|entry| !entry.value().is_expired(now))
      .map(|entry| entry.key().clone())
      .collect()
  }

  fn live(&self, key: &str) -> Option<StoredValue> {
    let now = Instant::now();
    let stored = self.entries.get(key)?.value().clone();
    if stored.is_expired(now) {
      self.entries.remove_if(key, |_, stored| stored.is_expired(now));
      return None;
    }
    Some(stored)
  }
}

#[async_trait]
impl TtlStore for MemoryTtlStore {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    Ok(self.live(key).map(|stored| stored.value))
  }

  async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
    self.entries.insert(
      key.to_string(),
      StoredValue {
        value: value.to_string(),
        expires_at: Some(Instant::now() + ttl),
      },
    );
    Ok(())
  }

  async fn increment(&self, key: &str, ttl_on_create: Duration) -> Result<i64, StoreError> {
    let now = Instant::now();

    match self.entries.entry(key.to_string()) {
      Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
        let stored = occupied.get_mut();
        let current: i64 = stored.value.parse().map_err(|_| StoreError::InvalidValue {
          key: key.to_string(),
        })?;
        let next = current + 1;
        stored.value = next.to_string();
        Ok(next)
      }
      Entry::Occupied(mut occupied) => {
        occupied.insert(StoredValue {
          value: "1".to_string(),
          expires_at: Some(now + ttl_on_create),
        });
        Ok(1)
      }
      Entry::Vacant(vacant) => {
        vacant.insert(StoredValue {
          value: "1".to_string(),
          expires_at: Some(now + ttl_on_create),
        });
        Ok(1)
      }
    }
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
    let now = Instant::now();
    match self.entries.get_mut(key) {
      Some(mut stored) if !stored.is_expired(now) => {
        stored.expires_at = Some(now + ttl);
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
    let now = Instant::now();
    Ok(
      self
        .live(key)
        .and_then(|stored| stored.expires_at)
        .map(|at| at.saturating_duration_since(now)),
    )
  }

  async fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
    for key in keys {
      self.entries.remove(*key);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_increment_sets_ttl_only_on_create() {
    let store = MemoryTtlStore::new();

    assert_eq!(store.increment("k", Duration::from_secs(10)).await.unwrap(), 1);
    tokio::time::advance(Duration::from_secs(4)).await;
    assert_eq!(store.increment("k", Duration::from_secs(10)).await.unwrap(), 2);

    let ttl = store.ttl("k").await.unwrap().unwrap();
    assert_eq!(ttl, Duration::from_secs(6));

    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(store.get("k").await.unwrap(), None);
    assert_eq!(store.increment("k", Duration::from_secs(10)).await.unwrap(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_set_expire_and_delete() {
    let store = MemoryTtlStore::new();

    store.set("a", "x", Duration::from_secs(5)).await.unwrap();
    store.set("b", "y", Duration::from_secs(5)).await.unwrap();
    assert!(store.expire("a", Duration::from_secs(60)).await.unwrap());
    assert!(!store.expire("missing", Duration::from_secs(60)).await.unwrap());

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(store.get("a").await.unwrap().as_deref(), Some("x"));
    assert_eq!(store.get("b").await.unwrap(), None);

    store.delete(&["a", "missing"]).await.unwrap();
    assert_eq!(store.get("a").await.unwrap(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_purge_expired() {
    let store = MemoryTtlStore::new();
    store.set("short", "1", Duration::from_secs(1)).await.unwrap();
    store.set("long", "1", Duration::from_secs(100)).await.unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;

    assert_eq!(store.purge_expired(), 1);
    assert_eq!(store.keys(), vec!["long".to_string()]);
  }

  #[tokio::test]
  async fn test_increment_rejects_non_numeric_value() {
    let store = MemoryTtlStore::new();
    store.set("k", "not-a-number", Duration::from_secs(5)).await.unwrap();

    assert!(matches!(
      store.increment("k", Duration::from_secs(5)).await,
      Err(StoreError::InvalidValue { .. })
    ));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_increments_are_atomic() {
    let store = std::sync::Arc::new(MemoryTtlStore::new());

    let tasks: Vec<_> = (0..50)
      .map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.increment("k", Duration::from_secs(60)).await })
      })
      .collect();

    for task in tasks {
      task.await.unwrap().unwrap();
    }

    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("50"));
  }
}
