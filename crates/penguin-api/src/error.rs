//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{"code": "<KIND>", "message": "..."}`, plus
//! `violations` for validation failures.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// One failed validation constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
  pub field:   String,
  /// The constraint that failed, e.g. `required`, `max`, `oneof`.
  pub tag:     String,
  pub message: String,
}

impl FieldViolation {
  pub fn new(field: impl Into<String>, tag: &str, message: impl Into<String>) -> Self {
    Self { field: field.into(), tag: tag.to_owned(), message: message.into() }
  }
}

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("invalid request: {message}")]
  InvalidRequest {
    message:    String,
    violations: Vec<FieldViolation>,
  },

  #[error("too many requests")]
  TooManyRequests,

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn invalid(message: impl Into<String>) -> Self {
    Self::InvalidRequest { message: message.into(), violations: Vec::new() }
  }

  pub fn violations(violations: Vec<FieldViolation>) -> Self {
    let message = violations
      .iter()
      .map(|v| v.message.as_str())
      .collect::<Vec<_>>()
      .join("; ");
    Self::InvalidRequest { message, violations }
  }

  pub fn internal<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Internal(Box::new(e))
  }

  pub fn code(&self) -> &'static str {
    match self {
      Self::NotFound(_) => "NOT_FOUND",
      Self::InvalidRequest { .. } => "INVALID_REQUEST",
      Self::TooManyRequests => "TOO_MANY_REQUESTS",
      Self::Internal(_) => "INTERNAL_ERROR",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
      Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<penguin_core::Error> for ApiError {
  fn from(e: penguin_core::Error) -> Self { Self::invalid(e.to_string()) }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
  code:       &'static str,
  message:    &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  violations: Option<&'a [FieldViolation]>,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let code = self.code();
    let (message, violations) = match &self {
      ApiError::NotFound(m) => (m.as_str(), None),
      ApiError::InvalidRequest { message, violations } => {
        (message.as_str(), (!violations.is_empty()).then_some(violations.as_slice()))
      }
      ApiError::TooManyRequests => ("too many requests", None),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "internal error");
        ("internal error", None)
      }
    };
    (status, Json(ErrorBody { code, message, violations })).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn body_json(resp: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn violations_are_rendered() {
    let err = ApiError::violations(vec![FieldViolation::new(
      "drops[0].quantity",
      "max",
      "quantity must be at most 1000",
    )]);
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert_eq!(body["violations"][0]["field"], "drops[0].quantity");
    assert_eq!(body["violations"][0]["tag"], "max");
  }

  #[tokio::test]
  async fn internal_errors_hide_details() {
    let err = ApiError::internal(std::io::Error::other("disk on fire"));
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert!(!body["message"].as_str().unwrap().contains("disk"));
    assert!(body.get("violations").is_none());
  }
}
