//! The shared key/value collaborator.
//!
//! Holds idempotency records and short-lived task → report mappings. Values
//! are opaque bytes; entries expire after their TTL. There is no iteration.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("kv error: {0}")]
pub struct KvError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl KvError {
  pub fn new<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self(Box::new(e))
  }
}

#[async_trait]
pub trait KeyValue: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

  async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError>;

  async fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// KV key under which the worker records the report id of a task.
pub fn task_report_key(task_id: &str) -> String { format!("report:{task_id}") }

/// Lifetime of task → report mappings.
pub const TASK_REPORT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
