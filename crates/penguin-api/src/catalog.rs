//! Handlers for catalog endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/items[/:arkItemId]` | 404 for unknown ids |
//! | `GET`  | `/zones[/:arkZoneId]` | 404 for unknown ids |
//! | `GET`  | `/stages[/:arkStageId]` | `?server`, defaults to CN |
//! | `GET`  | `/period` | Activities |
//! | `GET`  | `/notice` | Uncached |
//! | `GET`  | `/formula`, `/config` | Stored JSON documents |

use std::collections::HashSet;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use penguin_core::{
  model::{DropInfo, Server, exists_on},
  store::{CatalogStore, QueryStore},
};
use serde::Deserialize;

use crate::{
  ApiState,
  caches::CATALOG_TTL,
  error::ApiError,
  headers::Cached,
  params,
  shim::{ActivityShim, Catalog, ItemShim, NoticeShim, StageShim, ZoneShim},
};

#[derive(Debug, Default, Deserialize)]
pub struct ServerParams {
  pub server: Option<String>,
}

// ─── Items ───────────────────────────────────────────────────────────────────

/// `GET /items`
pub async fn items<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
) -> Result<Cached<Vec<ItemShim>>, ApiError> {
  let store = state.store.as_ref();
  state
    .caches
    .singular(&state.caches.items, CATALOG_TTL, || async move {
      let items = store.items().await.map_err(ApiError::internal)?;
      Ok::<_, ApiError>(items.iter().map(ItemShim::from).collect())
    })
    .await
}

/// `GET /items/:arkItemId`
pub async fn item<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  Path(ark_item_id): Path<String>,
) -> Result<Cached<ItemShim>, ApiError> {
  let store = state.store.as_ref();
  let id = ark_item_id.as_str();
  state
    .caches
    .keyed(&state.caches.item, id, CATALOG_TTL, || async move {
      let items = store.items().await.map_err(ApiError::internal)?;
      items
        .iter()
        .find(|i| i.ark_item_id == id)
        .map(ItemShim::from)
        .ok_or_else(|| ApiError::NotFound(format!("item {id} not found")))
    })
    .await
}

// ─── Zones ───────────────────────────────────────────────────────────────────

/// `GET /zones`
pub async fn zones<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
) -> Result<Cached<Vec<ZoneShim>>, ApiError> {
  let store = state.store.as_ref();
  state
    .caches
    .singular(&state.caches.zones, CATALOG_TTL, || async move {
      let zones = store.zones().await.map_err(ApiError::internal)?;
      let stages = store.stages().await.map_err(ApiError::internal)?;
      Ok::<_, ApiError>(zones.iter().map(|z| ZoneShim::new(z, &stages)).collect())
    })
    .await
}

/// `GET /zones/:arkZoneId`
pub async fn zone<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  Path(ark_zone_id): Path<String>,
) -> Result<Cached<ZoneShim>, ApiError> {
  let store = state.store.as_ref();
  let id = ark_zone_id.as_str();
  state
    .caches
    .keyed(&state.caches.zone, id, CATALOG_TTL, || async move {
      let zones = store.zones().await.map_err(ApiError::internal)?;
      let zone = zones
        .iter()
        .find(|z| z.ark_zone_id == id)
        .ok_or_else(|| ApiError::NotFound(format!("zone {id} not found")))?;
      let stages = store.stages().await.map_err(ApiError::internal)?;
      Ok::<_, ApiError>(ZoneShim::new(zone, &stages))
    })
    .await
}

// ─── Stages ──────────────────────────────────────────────────────────────────

/// Drop infos of `server` in ranges that contain `now`.
async fn current_drop_infos<S: CatalogStore>(
  store: &S,
  server: Server,
  now: DateTime<Utc>,
) -> Result<Vec<DropInfo>, S::Error> {
  let active: HashSet<i64> = store
    .time_ranges(server)
    .await?
    .iter()
    .filter(|r| r.contains(now))
    .map(|r| r.range_id)
    .collect();
  Ok(
    store
      .drop_infos(server)
      .await?
      .into_iter()
      .filter(|i| active.contains(&i.range_id))
      .collect(),
  )
}

async fn stage_shims<S: CatalogStore>(store: &S, server: Server) -> Result<Vec<StageShim>, ApiError> {
  let catalog = Catalog::load(store).await.map_err(ApiError::internal)?;
  let infos = current_drop_infos(store, server, Utc::now())
    .await
    .map_err(ApiError::internal)?;
  Ok(
    catalog
      .stages
      .iter()
      .filter(|s| exists_on(&s.existence, server))
      .map(|s| StageShim::new(s, &catalog, &infos))
      .collect(),
  )
}

/// `GET /stages?server=CN`
pub async fn stages<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  Query(p): Query<ServerParams>,
) -> Result<Cached<Vec<StageShim>>, ApiError> {
  let server = params::server(p.server.as_deref())?;
  let store = state.store.as_ref();
  state
    .caches
    .keyed(&state.caches.stages, server.as_ref(), CATALOG_TTL, || stage_shims(store, server))
    .await
}

/// `GET /stages/:arkStageId?server=CN`
pub async fn stage<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  Path(ark_stage_id): Path<String>,
  Query(p): Query<ServerParams>,
) -> Result<Cached<StageShim>, ApiError> {
  let server = params::server(p.server.as_deref())?;
  let store = state.store.as_ref();
  let id = ark_stage_id.as_str();
  let key = format!("{server}|{id}");
  state
    .caches
    .keyed(&state.caches.stage, &key, CATALOG_TTL, || async move {
      stage_shims(store, server)
        .await?
        .into_iter()
        .find(|s| s.stage_id == id)
        .ok_or_else(|| ApiError::NotFound(format!("stage {id} not found")))
    })
    .await
}

// ─── Misc ────────────────────────────────────────────────────────────────────

/// `GET /period`
pub async fn period<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
) -> Result<Cached<Vec<ActivityShim>>, ApiError> {
  let store = state.store.as_ref();
  state
    .caches
    .singular(&state.caches.activities, CATALOG_TTL, || async move {
      let activities = store.activities().await.map_err(ApiError::internal)?;
      Ok::<_, ApiError>(activities.iter().map(ActivityShim::from).collect())
    })
    .await
}

/// `GET /notice`
pub async fn notice<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<NoticeShim>>, ApiError> {
  let notices = state.store.notices().await.map_err(ApiError::internal)?;
  Ok(Json(notices.iter().map(NoticeShim::from).collect()))
}

async fn property<S: CatalogStore>(store: &S, key: &str) -> Result<Json<serde_json::Value>, ApiError> {
  store
    .property(key)
    .await
    .map_err(ApiError::internal)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("{key} not configured")))
}

/// `GET /formula`
pub async fn formula<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
) -> Result<Json<serde_json::Value>, ApiError> {
  property(state.store.as_ref(), "formula").await
}

/// `GET /config`
pub async fn frontend_config<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
) -> Result<Json<serde_json::Value>, ApiError> {
  property(state.store.as_ref(), "frontend_config").await
}
