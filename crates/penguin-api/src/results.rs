//! Handlers for the aggregated result endpoints.
//!
//! | Method | Path | Cache |
//! |--------|------|-------|
//! | `GET`  | `/result/matrix` | `shimGlobalDropMatrix#server\|showClosedZones\|sourceCategory` |
//! | `GET`  | `/result/pattern` | `shimLatestPatternMatrixResults#server\|sourceCategory` |
//! | `GET`  | `/result/trends` | `shimSavedTrendResults#server` |
//! | `GET`  | `/stats` | `shimSiteStats#server` |
//!
//! `is_personal=true` computes the caller's own results from raw reports and
//! never touches the caches.

use std::collections::BTreeMap;

use axum::{
  Json,
  extract::{Query, State},
  response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use penguin_core::{
  model::{Server, SourceCategory, is_open},
  store::{QueryStore, ReportRowQuery},
};
use serde::Deserialize;

use crate::{
  ApiState,
  caches::AGGREGATE_TTL,
  compute,
  error::ApiError,
  identity::PenguinId,
  params,
  shim::{
    Catalog, DropMatrixResult, ItemTrend, MatrixEntry, PatternDrop, PatternDrops, PatternEntry,
    PatternMatrixResult, SiteStatsShim, StageTrend, TrendResult, end_ms,
  },
};

#[derive(Debug, Default, Deserialize)]
pub struct ResultParams {
  pub server:            Option<String>,
  #[serde(default)]
  pub is_personal:       bool,
  #[serde(default)]
  pub show_closed_zones: bool,
  /// Source category: `all`, `automated` or `manual`.
  pub category:          Option<String>,
  /// Comma-separated ark stage ids.
  #[serde(rename = "stageFilter")]
  pub stage_filter:      Option<String>,
  /// Comma-separated ark item ids.
  #[serde(rename = "itemFilter")]
  pub item_filter:       Option<String>,
}

// ─── Personal ────────────────────────────────────────────────────────────────

/// All trusted reports of the caller, or `None` for an unknown caller.
async fn personal_rows<S: QueryStore>(
  state: &ApiState<S>,
  penguin_id: Option<&str>,
  server: Server,
  category: SourceCategory,
) -> Result<Option<(Catalog, Vec<penguin_core::aggregate::ReportRow>)>, ApiError> {
  let Some(penguin_id) = penguin_id else {
    return Ok(None);
  };
  let Some(account) = state
    .store
    .account_by_penguin_id(penguin_id)
    .await
    .map_err(ApiError::internal)?
  else {
    return Ok(None);
  };
  let query = ReportRowQuery {
    server,
    stage_ids: Vec::new(),
    account_id: Some(account.account_id),
    source_category: category,
    automated: state.automated_sources.to_vec(),
    start: DateTime::<Utc>::UNIX_EPOCH,
    end: Utc::now(),
  };
  let rows = state.store.report_rows(&query).await.map_err(ApiError::internal)?;
  let catalog = Catalog::load(state.store.as_ref()).await.map_err(ApiError::internal)?;
  Ok(Some((catalog, rows)))
}

// ─── Drop matrix ─────────────────────────────────────────────────────────────

async fn global_drop_matrix<S: QueryStore>(
  store: &S,
  server: Server,
  show_closed_zones: bool,
  category: SourceCategory,
) -> Result<DropMatrixResult, ApiError> {
  let catalog = Catalog::load(store).await.map_err(ApiError::internal)?;
  let elements = store
    .drop_matrix_elements(server, category)
    .await
    .map_err(ApiError::internal)?;
  let now = Utc::now();
  let open = |stage_id: i64, end: DateTime<Utc>| {
    end > now
      && catalog
        .stage(stage_id)
        .and_then(|s| catalog.zone(s.zone_id))
        .is_some_and(|z| is_open(&z.existence, server, now))
  };

  let matrix = elements
    .iter()
    .filter(|e| show_closed_zones || open(e.stage_id, e.end_time))
    .filter_map(|e| {
      Some(MatrixEntry {
        stage_id: catalog.stage_ark(e.stage_id)?.to_owned(),
        item_id:  catalog.item_ark(e.item_id)?.to_owned(),
        quantity: e.quantity,
        times:    e.times,
        start:    e.start_time.timestamp_millis(),
        end:      end_ms(e.end_time),
      })
    })
    .collect();
  Ok(DropMatrixResult { matrix })
}

/// `GET /result/matrix`
pub async fn matrix<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  PenguinId(penguin_id): PenguinId,
  Query(p): Query<ResultParams>,
) -> Result<Response, ApiError> {
  let server = params::server(p.server.as_deref())?;
  let category = params::category(p.category.as_deref())?;
  let stages = params::list(p.stage_filter.as_deref());
  let items = params::list(p.item_filter.as_deref());

  if p.is_personal {
    let matrix = match personal_rows(&state, penguin_id.as_deref(), server, category).await? {
      Some((catalog, rows)) => {
        let start = rows.first().map_or(0, |r| r.created_at.timestamp_millis());
        compute::drop_matrix(&rows, &catalog, &BTreeMap::new(), None, start, None)
      }
      None => Vec::new(),
    };
    let result = DropMatrixResult { matrix }.filtered(stages.as_deref(), items.as_deref());
    return Ok(Json(result).into_response());
  }

  let key = format!("{server}|{}|{category}", p.show_closed_zones);
  let store = state.store.as_ref();
  let cached = state
    .caches
    .keyed(&state.caches.global_drop_matrix, &key, AGGREGATE_TTL, || {
      global_drop_matrix(store, server, p.show_closed_zones, category)
    })
    .await?;
  Ok(
    cached
      .map(|m| m.filtered(stages.as_deref(), items.as_deref()))
      .into_response(),
  )
}

// ─── Pattern matrix ──────────────────────────────────────────────────────────

async fn latest_pattern_matrix<S: QueryStore>(
  store: &S,
  server: Server,
  category: SourceCategory,
) -> Result<PatternMatrixResult, ApiError> {
  let catalog = Catalog::load(store).await.map_err(ApiError::internal)?;
  let elements = store
    .latest_pattern_matrix_elements(server, category)
    .await
    .map_err(ApiError::internal)?;

  let pattern_matrix = elements
    .iter()
    .filter_map(|e| {
      let drops = e
        .drops
        .iter()
        .map(|d| {
          Some(PatternDrop { item_id: catalog.item_ark(d.item_id)?.to_owned(), quantity: d.quantity })
        })
        .collect::<Option<Vec<_>>>()?;
      Some(PatternEntry {
        stage_id: catalog.stage_ark(e.stage_id)?.to_owned(),
        times:    e.times,
        quantity: e.quantity,
        pattern:  PatternDrops { drops },
        start:    e.start_time.timestamp_millis(),
        end:      end_ms(e.end_time),
      })
    })
    .collect();
  Ok(PatternMatrixResult { pattern_matrix })
}

/// `GET /result/pattern`
pub async fn pattern<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  PenguinId(penguin_id): PenguinId,
  Query(p): Query<ResultParams>,
) -> Result<Response, ApiError> {
  let server = params::server(p.server.as_deref())?;
  let category = params::category(p.category.as_deref())?;
  let stages = params::list(p.stage_filter.as_deref());

  if p.is_personal {
    let pattern_matrix = match personal_rows(&state, penguin_id.as_deref(), server, category).await? {
      Some((catalog, rows)) => {
        let start = rows.first().map_or(0, |r| r.created_at.timestamp_millis());
        compute::pattern_matrix(&rows, &catalog, start, None)
      }
      None => Vec::new(),
    };
    let result = PatternMatrixResult { pattern_matrix }.filtered(stages.as_deref());
    return Ok(Json(result).into_response());
  }

  let key = format!("{server}|{category}");
  let store = state.store.as_ref();
  let cached = state
    .caches
    .keyed(&state.caches.latest_pattern_matrix, &key, AGGREGATE_TTL, || {
      latest_pattern_matrix(store, server, category)
    })
    .await?;
  Ok(cached.map(|m| m.filtered(stages.as_deref())).into_response())
}

// ─── Trends ──────────────────────────────────────────────────────────────────

async fn saved_trends<S: QueryStore>(store: &S, server: Server) -> Result<TrendResult, ApiError> {
  let catalog = Catalog::load(store).await.map_err(ApiError::internal)?;
  let elements = store.trend_elements(server).await.map_err(ApiError::internal)?;

  let mut sections: BTreeMap<i64, usize> = BTreeMap::new();
  let mut starts: BTreeMap<i64, DateTime<Utc>> = BTreeMap::new();
  for e in &elements {
    let len = usize::try_from(e.group_id + 1).unwrap_or_default();
    let n = sections.entry(e.stage_id).or_default();
    *n = (*n).max(len);
    let start = starts.entry(e.stage_id).or_insert(e.start_time);
    *start = (*start).min(e.start_time);
  }

  let mut result = TrendResult::default();
  for e in &elements {
    let (Some(stage), Some(item)) = (catalog.stage_ark(e.stage_id), catalog.item_ark(e.item_id)) else {
      continue;
    };
    let Ok(group) = usize::try_from(e.group_id) else {
      continue;
    };
    let len = sections.get(&e.stage_id).copied().unwrap_or_default();
    let stage_trend = result.trend.entry(stage.to_owned()).or_insert_with(|| StageTrend {
      start_time: starts.get(&e.stage_id).map_or(0, |t| t.timestamp_millis()),
      results:    BTreeMap::new(),
    });
    let item_trend = stage_trend.results.entry(item.to_owned()).or_insert_with(|| ItemTrend {
      quantity: vec![0; len],
      times:    vec![0; len],
    });
    item_trend.quantity[group] = e.quantity;
    item_trend.times[group] = e.times;
  }
  Ok(result)
}

/// `GET /result/trends`
pub async fn trends<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  Query(p): Query<ResultParams>,
) -> Result<Response, ApiError> {
  let server = params::server(p.server.as_deref())?;
  let store = state.store.as_ref();
  let cached = state
    .caches
    .keyed(&state.caches.saved_trends, server.as_ref(), AGGREGATE_TTL, || {
      saved_trends(store, server)
    })
    .await?;
  Ok(cached.into_response())
}

// ─── Site stats ──────────────────────────────────────────────────────────────

/// `GET /stats`
pub async fn stats<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  Query(p): Query<ResultParams>,
) -> Result<Response, ApiError> {
  let server = params::server(p.server.as_deref())?;
  let store = state.store.as_ref();
  let cached = state
    .caches
    .keyed(&state.caches.site_stats, server.as_ref(), AGGREGATE_TTL, || async move {
      let stats = store.site_stats(server).await.map_err(ApiError::internal)?;
      let catalog = Catalog::load(store).await.map_err(ApiError::internal)?;
      Ok::<_, ApiError>(SiteStatsShim::new(&stats, &catalog))
    })
    .await?;
  Ok(cached.into_response())
}
