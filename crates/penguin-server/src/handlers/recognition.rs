//! `POST /report/recognition`: an encrypted batch of recognized screenshots.
//!
//! Entries are validated one by one; invalid entries are skipped and listed
//! in `errors`. The valid ones travel as a single task.

use axum::{
  Json,
  extract::State,
  response::{IntoResponse, Response},
};
use penguin_api::{
  ApiError,
  identity::{ClientIp, PenguinId},
};
use penguin_core::store::ReportStore;
use serde::Serialize;

use super::{new_task, parse_json, publish, resolve_account, set_identity, single_report};
use crate::{AppState, bus::SUBJECT_BATCH, validate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchError {
  pub index:  usize,
  pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResponse {
  pub task_id: String,
  pub errors:  Vec<BatchError>,
}

pub async fn handler<S: ReportStore + 'static>(
  State(state): State<AppState<S>>,
  PenguinId(penguin_id): PenguinId,
  ClientIp(ip): ClientIp,
  body: String,
) -> Result<Response, ApiError> {
  let plaintext = state.keys.open(&body)?;
  let request: validate::BatchReportRequest = parse_json(&plaintext)?;
  let envelope = validate::batch(&request)?;

  let mut reports = Vec::with_capacity(request.batch_drops.len());
  let mut errors = Vec::new();
  for (index, entry) in request.batch_drops.iter().enumerate() {
    let valid = match validate::batch_drop(index, entry) {
      Ok(valid) => valid,
      Err(violations) => {
        let reason = violations.into_iter().map(|v| v.message).collect::<Vec<_>>().join("; ");
        errors.push(BatchError { index, reason });
        continue;
      }
    };
    match single_report(state.store.as_ref(), valid).await {
      Ok(report) => reports.push(report),
      Err(ApiError::InvalidRequest { message, .. }) => errors.push(BatchError { index, reason: message }),
      Err(other) => return Err(other),
    }
  }
  if reports.is_empty() {
    let reasons = errors.iter().map(|e| format!("[{}] {}", e.index, e.reason));
    return Err(ApiError::invalid(format!(
      "no valid reports in batch: {}",
      reasons.collect::<Vec<_>>().join("; ")
    )));
  }

  let (account, created) = resolve_account(state.store.as_ref(), penguin_id).await?;
  let task = new_task(envelope, reports, account.account_id, ip);
  publish(state.bus.as_ref(), SUBJECT_BATCH, &task).await?;
  if !errors.is_empty() {
    tracing::info!(task_id = %task.task_id, skipped = errors.len(), "batch entries skipped");
  }

  let mut resp = Json(RecognitionResponse { task_id: task.task_id, errors }).into_response();
  if created {
    set_identity(resp.headers_mut(), &account.penguin_id);
  }
  Ok(resp)
}
