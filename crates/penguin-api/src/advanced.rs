//! `POST /advanced`: ad-hoc drop matrices and trends over arbitrary windows.
//!
//! Each sub-query runs in drop-matrix mode, or in trend mode when `interval`
//! is set. Results are computed from raw reports and never cached, though the
//! per-range item sets used to zero-fill matrices are.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use penguin_core::{
  model::{Server, SourceCategory},
  store::{CatalogStore, QueryStore, ReportRowQuery},
};
use serde::{Deserialize, Serialize};

use crate::{
  ApiState,
  caches::CATALOG_TTL,
  compute::{self, TrendWindow},
  error::{ApiError, FieldViolation},
  identity::{ClientIp, PenguinId},
  shim::{Catalog, DropMatrixResult, TrendResult},
};

/// Most sub-queries accepted per request.
pub const MAX_QUERIES: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedQuery {
  #[serde(default)]
  pub server:          Option<Server>,
  pub stage_id:        String,
  #[serde(default)]
  pub item_ids:        Option<Vec<String>>,
  #[serde(default)]
  pub is_personal:     bool,
  #[serde(default)]
  pub source_category: Option<SourceCategory>,
  /// Epoch milliseconds.
  pub start:           Option<i64>,
  /// Epoch milliseconds; defaults to now.
  pub end:             Option<i64>,
  /// Milliseconds; switches the query to trend mode.
  pub interval:        Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvancedRequest {
  pub queries: Vec<AdvancedQuery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AdvancedResult {
  Matrix(DropMatrixResult),
  Trend(TrendResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvancedResponse {
  pub advanced_results: Vec<AdvancedResult>,
}

fn validate(request: &AdvancedRequest) -> Result<(), ApiError> {
  if request.queries.is_empty() || request.queries.len() > MAX_QUERIES {
    return Err(ApiError::violations(vec![FieldViolation::new(
      "queries",
      "max",
      format!("queries must contain 1 to {MAX_QUERIES} items"),
    )]));
  }
  Ok(())
}

/// Union of the item sets of every range of `server` that overlaps
/// `[start, end)`.
async fn expected_items<S: QueryStore>(
  state: &ApiState<S>,
  server: Server,
  stage_id: i64,
  start: DateTime<Utc>,
  end: DateTime<Utc>,
) -> Result<BTreeSet<i64>, ApiError> {
  let ranges = state.store.time_ranges(server).await.map_err(ApiError::internal)?;
  let store = state.store.as_ref();
  let mut items = BTreeSet::new();
  for range in ranges.iter().filter(|r| r.start_time < end && start < r.end_time) {
    let key = format!("{server}|{stage_id}|{}", range.range_id);
    let set = state
      .caches
      .keyed(&state.caches.item_drop_set, &key, CATALOG_TTL, || async move {
        store
          .item_drop_set(server, stage_id, range.range_id)
          .await
          .map_err(ApiError::internal)
      })
      .await?;
    items.extend(set.value);
  }
  Ok(items)
}

async fn run_query<S: QueryStore>(
  state: &ApiState<S>,
  catalog: &Catalog,
  account_id: Option<i64>,
  query: &AdvancedQuery,
) -> Result<AdvancedResult, ApiError> {
  let server = query.server.unwrap_or(Server::Cn);
  let stage = catalog
    .stage_by_ark(&query.stage_id)
    .ok_or_else(|| ApiError::NotFound(format!("stage {} not found", query.stage_id)))?;
  let items: Option<HashSet<i64>> = query
    .item_ids
    .as_ref()
    .map(|ids| {
      ids
        .iter()
        .map(|id| {
          catalog
            .item_by_ark(id)
            .map(|i| i.item_id)
            .ok_or_else(|| ApiError::NotFound(format!("item {id} not found")))
        })
        .collect()
    })
    .transpose()?;

  let end = query.end.unwrap_or_else(|| Utc::now().timestamp_millis());
  let window = match query.interval {
    Some(interval) => {
      let start = query
        .start
        .ok_or_else(|| ApiError::invalid("start is required for trend queries"))?;
      Some(TrendWindow::new(server, start, end, interval)?)
    }
    None => None,
  };
  let start = window.map_or(query.start.unwrap_or(0), |w| w.start);
  let end = window.map_or(end, |w| w.end());
  if start >= end {
    return Err(ApiError::invalid("start must be before end"));
  }
  let to_utc = |ms: i64| {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| ApiError::invalid("time out of range"))
  };
  let (start_at, end_at) = (to_utc(start)?, to_utc(end)?);

  if query.is_personal && account_id.is_none() {
    return Ok(match window {
      Some(_) => AdvancedResult::Trend(TrendResult::default()),
      None => AdvancedResult::Matrix(DropMatrixResult::default()),
    });
  }

  let row_query = ReportRowQuery {
    server,
    stage_ids: vec![stage.stage_id],
    account_id: account_id.filter(|_| query.is_personal),
    source_category: query.source_category.unwrap_or_default(),
    automated: state.automated_sources.to_vec(),
    start: start_at,
    end: end_at,
  };
  let rows = state.store.report_rows(&row_query).await.map_err(ApiError::internal)?;

  Ok(match window {
    Some(window) => AdvancedResult::Trend(compute::trend(&rows, catalog, window, items.as_ref())),
    None => {
      let expected = BTreeMap::from([(
        stage.stage_id,
        expected_items(state, server, stage.stage_id, start_at, end_at).await?,
      )]);
      AdvancedResult::Matrix(DropMatrixResult {
        matrix: compute::drop_matrix(&rows, catalog, &expected, items.as_ref(), start, Some(end)),
      })
    }
  })
}

/// `POST /advanced`
pub async fn handler<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  PenguinId(penguin_id): PenguinId,
  ClientIp(ip): ClientIp,
  Json(request): Json<AdvancedRequest>,
) -> Result<Json<AdvancedResponse>, ApiError> {
  state.advanced_limiter.check(&ip)?;
  validate(&request)?;

  let account_id = match penguin_id {
    Some(id) if request.queries.iter().any(|q| q.is_personal) => state
      .store
      .account_by_penguin_id(&id)
      .await
      .map_err(ApiError::internal)?
      .map(|a| a.account_id),
    _ => None,
  };
  let catalog = Catalog::load(state.store.as_ref()).await.map_err(ApiError::internal)?;

  let mut advanced_results = Vec::with_capacity(request.queries.len());
  for query in &request.queries {
    advanced_results.push(run_query(&state, &catalog, account_id, query).await?);
  }
  Ok(Json(AdvancedResponse { advanced_results }))
}
