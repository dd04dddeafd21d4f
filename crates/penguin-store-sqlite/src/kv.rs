//! [`SqliteKv`]: the TTL key/value collaborator on the `kv` table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension as _;

use penguin_core::kv::{KeyValue, KvError};

use crate::SqliteStore;

/// Expiring byte blobs stored next to the relational tables.
///
/// Expired rows are invisible to [`KeyValue::get`] and are removed lazily when
/// read or overwritten.
#[derive(Clone)]
pub struct SqliteKv {
  conn: tokio_rusqlite::Connection,
}

impl SqliteKv {
  pub fn new(store: &SqliteStore) -> Self { Self { conn: store.connection() } }
}

fn now_millis() -> i64 { Utc::now().timestamp_millis() }

#[async_trait]
impl KeyValue for SqliteKv {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
    let key = key.to_owned();
    let now = now_millis();
    self
      .conn
      .call(move |conn| {
        let row: Option<(Vec<u8>, i64)> = conn
          .query_row(
            "SELECT value, expires_at FROM kv WHERE key = ?1",
            rusqlite::params![key],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        match row {
          Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
          Some(_) => {
            conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
            Ok(None)
          }
          None => Ok(None),
        }
      })
      .await
      .map_err(KvError::new)
  }

  async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
    let key = key.to_owned();
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let expires_at = now_millis().saturating_add(ttl_ms);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
          rusqlite::params![key, value, expires_at],
        )?;
        Ok(())
      })
      .await
      .map_err(KvError::new)
  }

  async fn delete(&self, key: &str) -> Result<(), KvError> {
    let key = key.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
      })
      .await
      .map_err(KvError::new)
  }
}
