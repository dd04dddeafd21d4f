//! Error types and axum `IntoResponse` implementation.

use axum::{
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use penguin_api::ApiError;
use penguin_core::kv::KvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,

  #[error("no stream accepts subject {0:?}")]
  NoStream(String),

  #[error("bus is closed")]
  BusClosed,

  #[error("unknown recognition key {0:?}")]
  UnknownKey(String),

  #[error("decryption failed: {0}")]
  Decrypt(String),

  #[error("codec error: {0}")]
  Codec(String),

  #[error("task timed out")]
  Timeout,

  #[error(transparent)]
  Kv(#[from] KvError),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for ApiError {
  fn from(e: Error) -> Self {
    match e {
      Error::UnknownKey(_) | Error::Decrypt(_) | Error::Json(_) => ApiError::invalid(e.to_string()),
      other => ApiError::internal(other),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"penguin\""),
        );
        res
      }
      other => ApiError::from(other).into_response(),
    }
  }
}
