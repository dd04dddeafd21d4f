//! Ingestion route handlers.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/report` | [`report::handler`] |
//! | `POST` | `/report/recognition` | [`recognition::handler`] |
//! | `POST` | `/report/recall` | [`recall::handler`] |

pub mod recall;
pub mod recognition;
pub mod report;

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use bytes::Bytes;
use chrono::Utc;
use penguin_api::{ApiError, FieldViolation, identity::{SET_PENGUIN_ID_HEADER, user_cookie}};
use penguin_core::{
  ids::{generate_penguin_id, generate_task_id},
  report::{Account, Drop, ReportTask, SingleReport},
  store::ReportStore,
};
use serde::de::DeserializeOwned;

use crate::{
  bus::MessageBus,
  validate::{Envelope, ValidReport},
};

/// Attempts at drawing an unused penguin id.
const ACCOUNT_ATTEMPTS: usize = 100;

/// Decode a JSON body, mapping failures to `INVALID_REQUEST`.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
  serde_json::from_slice(body).map_err(|e| ApiError::invalid(format!("malformed body: {e}")))
}

/// Resolve the stage and items of a validated report.
///
/// Gacha-box stages count the total quantity as the number of clears.
pub(crate) async fn single_report<S: ReportStore>(
  store: &S,
  report: ValidReport,
) -> Result<SingleReport, ApiError> {
  let stage = store
    .stage_by_ark_id(&report.ark_stage_id)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| {
      ApiError::violations(vec![FieldViolation::new(
        "stageId",
        "exists",
        format!("stage {} not found", report.ark_stage_id),
      )])
    })?;

  let ark_ids: Vec<String> = report.drops.iter().map(|d| d.ark_item_id.clone()).collect();
  let ids = store.item_ids_by_ark_ids(&ark_ids).await.map_err(ApiError::internal)?;
  let mut drops = Vec::with_capacity(report.drops.len());
  for d in &report.drops {
    let item_id = *ids.get(&d.ark_item_id).ok_or_else(|| {
      ApiError::violations(vec![FieldViolation::new(
        "itemId",
        "exists",
        format!("item {} not found", d.ark_item_id),
      )])
    })?;
    drops.push(Drop { drop_type: d.drop_type, item_id, quantity: d.quantity });
  }

  let times = if stage.is_gacha_box() { drops.iter().map(|d| d.quantity).sum() } else { 1 };
  Ok(SingleReport { ark_stage_id: stage.ark_stage_id, drops, times, metadata: report.metadata })
}

/// The caller's account, creating one when the request carries no known id.
/// The flag is `true` for a new account.
pub(crate) async fn resolve_account<S: ReportStore>(
  store: &S,
  penguin_id: Option<String>,
) -> Result<(Account, bool), ApiError> {
  if let Some(id) = penguin_id
    && let Some(account) = store.account_by_penguin_id(&id).await.map_err(ApiError::internal)?
  {
    return Ok((account, false));
  }
  for _ in 0..ACCOUNT_ATTEMPTS {
    let candidate = generate_penguin_id(&mut rand::thread_rng());
    if let Some(account) = store.create_account(&candidate).await.map_err(ApiError::internal)? {
      tracing::info!(penguin_id = %account.penguin_id, "account created");
      return Ok((account, true));
    }
  }
  Err(ApiError::internal(std::io::Error::other("exhausted penguin id attempts")))
}

/// Announce a newly created account on the response.
pub(crate) fn set_identity(headers: &mut HeaderMap, penguin_id: &str) {
  if let Some(cookie) = user_cookie(penguin_id) {
    headers.insert(header::SET_COOKIE, cookie);
  }
  if let Ok(value) = HeaderValue::from_str(penguin_id) {
    headers.insert(HeaderName::from_static(SET_PENGUIN_ID_HEADER), value);
  }
}

pub(crate) fn new_task(
  envelope: Envelope,
  reports: Vec<SingleReport>,
  account_id: i64,
  ip: String,
) -> ReportTask {
  let now = Utc::now();
  ReportTask {
    task_id: generate_task_id(now, &mut rand::thread_rng()),
    created_at: now.timestamp_micros(),
    server: envelope.server,
    source: envelope.source,
    version: envelope.version,
    reports,
    account_id,
    ip,
  }
}

pub(crate) async fn publish(
  bus: &dyn MessageBus,
  subject: &str,
  task: &ReportTask,
) -> Result<(), ApiError> {
  let payload = Bytes::from(serde_json::to_vec(task).map_err(ApiError::internal)?);
  bus.publish(subject, payload).await?;
  tracing::info!(
    task_id = %task.task_id,
    subject,
    reports = task.reports.len(),
    account_id = task.account_id,
    "task published",
  );
  Ok(())
}
