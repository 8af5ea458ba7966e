use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;

use crate::domain::auth::errors::StoreError;
use crate::domain::auth::ports::TtlStore;

/// INCR and set the expiry only when this increment created the key
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// TTL store shared by every instance through Redis
///
/// Increment-with-expiry runs as one Lua script so the counter can never be
/// left without a TTL.
#[derive(Clone)]
pub struct RedisTtlStore {
  connection: ConnectionManager,
  increment_script: Script,
  key_prefix: String,
}

impl RedisTtlStore {
  pub fn new(connection: ConnectionManager, key_prefix: impl Into<String>) -> Self {
    Self {
      connection,
      increment_script: Script::new(INCREMENT_SCRIPT),
      key_prefix: key_prefix.into(),
    }
  }

  fn key(&self, key: &str) -> String {
    format!("{}:{}", self.key_prefix, key)
  }
}

fn millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl TtlStore for RedisTtlStore {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let mut conn = self.connection.clone();
    let value: Option<String> = redis::cmd("GET")
      .arg(self.key(key))
      .query_async(&mut conn)
      .await?;
    Ok(value)
  }

  async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
    let mut conn = self.connection.clone();
    let _: () = redis::cmd("SET")
      .arg(self.key(key))
      .arg(value)
      .arg("PX")
      .arg(millis(ttl))
      .query_async(&mut conn)
      .await?;
    Ok(())
  }

  async fn increment(&self, key: &str, ttl_on_create: Duration) -> Result<i64, StoreError> {
    let mut conn = self.connection.clone();
    let count: i64 = self
      .increment_script
      .key(self.key(key))
      .arg(millis(ttl_on_create))
      .invoke_async(&mut conn)
      .await?;
    Ok(count)
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
    let mut conn = self.connection.clone();
    let updated: i64 = redis::cmd("PEXPIRE")
      .arg(self.key(key))
      .arg(millis(ttl))
      .query_async(&mut conn)
      .await?;
    Ok(updated == 1)
  }

  async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
    let mut conn = self.connection.clone();
    // -2: no such key, -1: no expiry
    let remaining: i64 = redis::cmd("PTTL")
      .arg(self.key(key))
      .query_async(&mut conn)
      .await?;
    Ok(u64::try_from(remaining).ok().map(Duration::from_millis))
  }

  async fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
    if keys.is_empty() {
      return Ok(());
    }

    let mut conn = self.connection.clone();
    let keys: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
    let _: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
    Ok(())
  }
}
