//! `POST /report/recall`: withdraw the reports of a task.

use axum::{extract::State, http::StatusCode};
use bytes::Bytes;
use penguin_api::{ApiError, FieldViolation};
use penguin_core::{ids::is_valid_task_id, kv::task_report_key, store::ReportStore};
use serde::Deserialize;

use super::parse_json;
use crate::{AppState, error::Error};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecallRequest {
  pub report_hash: String,
}

/// Parse the worker's task → report record: report ids joined by `,`.
pub fn parse_report_ids(raw: &[u8]) -> Option<Vec<i64>> {
  std::str::from_utf8(raw)
    .ok()?
    .split(',')
    .map(|id| id.trim().parse().ok())
    .collect()
}

pub async fn handler<S: ReportStore + 'static>(
  State(state): State<AppState<S>>,
  body: Bytes,
) -> Result<StatusCode, ApiError> {
  let request: RecallRequest = parse_json(&body)?;
  if !is_valid_task_id(&request.report_hash) {
    return Err(ApiError::violations(vec![FieldViolation::new(
      "reportHash",
      "format",
      "reportHash is not a valid report hash",
    )]));
  }

  let raw = state
    .kv
    .get(&task_report_key(&request.report_hash))
    .await
    .map_err(Error::from)?
    .ok_or_else(|| ApiError::invalid("report not found or expired"))?;
  let ids = parse_report_ids(&raw)
    .ok_or_else(|| ApiError::internal(std::io::Error::other("malformed task record")))?;

  let mut recalled = 0;
  for id in ids {
    if state.store.recall_report(id).await.map_err(ApiError::internal)? {
      recalled += 1;
    }
  }
  if recalled == 0 {
    return Err(ApiError::invalid("report already recalled"));
  }
  tracing::info!(report_hash = %request.report_hash, recalled, "reports recalled");
  Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn task_records_parse() {
    assert_eq!(parse_report_ids(b"42"), Some(vec![42]));
    assert_eq!(parse_report_ids(b"1,2,3"), Some(vec![1, 2, 3]));
    assert_eq!(parse_report_ids(b"1,x"), None);
  }
}
