//! `POST /report`: accept one stage clear and enqueue it.

use axum::{
  Json,
  extract::State,
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use penguin_api::{
  ApiError,
  identity::{ClientIp, PenguinId},
};
use penguin_core::store::ReportStore;
use serde::Serialize;

use super::{new_task, parse_json, publish, resolve_account, set_identity, single_report};
use crate::{AppState, bus::SUBJECT_SINGULAR, validate};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
  /// The task id; used to recall the report.
  pub report_hash: String,
}

pub async fn handler<S: ReportStore + 'static>(
  State(state): State<AppState<S>>,
  PenguinId(penguin_id): PenguinId,
  ClientIp(ip): ClientIp,
  body: Bytes,
) -> Result<Response, ApiError> {
  let request: validate::ReportRequest = parse_json(&body)?;
  let (envelope, report) = validate::report(&request)?;
  let report = single_report(state.store.as_ref(), report).await?;
  let (account, created) = resolve_account(state.store.as_ref(), penguin_id).await?;

  let task = new_task(envelope, vec![report], account.account_id, ip);
  publish(state.bus.as_ref(), SUBJECT_SINGULAR, &task).await?;

  let mut resp = Json(ReportResponse { report_hash: task.task_id }).into_response();
  if created {
    set_identity(resp.headers_mut(), &account.penguin_id);
  }
  Ok(resp)
}
