//! Error type for `penguin-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] penguin_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unexpected column value: {0}")]
  InvalidColumn(String),

  #[error("stage not found: {0}")]
  StageNotFound(String),

  #[error("report count {reports} does not match reliability count {reliabilities}")]
  ReliabilityMismatch { reports: usize, reliabilities: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
