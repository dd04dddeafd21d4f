//! Error types for `penguin-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown server: {0:?}")]
  UnknownServer(String),

  #[error("unknown drop type: {0:?}")]
  UnknownDropType(String),

  #[error("unknown source category: {0:?}")]
  UnknownSourceCategory(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
