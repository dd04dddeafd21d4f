//! Versioned snapshots served as JSON merge patches (RFC 7386).
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/{server}/{realm}/latest` | `{"version": n}`; 404 when no snapshot exists |
//! | `GET`  | `/{server}/{realm}/patch/{from}...{to}` | Merge patch; 204 when `from == to` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use penguin_core::{model::Server, store::QueryStore};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
  error::ApiError,
  headers::{IMMUTABLE_MAX_AGE_SECS, set_cache_headers},
};

pub const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";

/// The merge patch that turns `from` into `to`.
///
/// Object members are diffed recursively; any other change replaces the
/// value wholesale. A `null` inside `to` cannot be expressed and reads as a
/// removal when applied.
pub fn diff(from: &Value, to: &Value) -> Value {
  match (from, to) {
    (Value::Object(a), Value::Object(b)) => {
      let mut patch = Map::new();
      for (key, old) in a {
        match b.get(key) {
          None => {
            patch.insert(key.clone(), Value::Null);
          }
          Some(new) if new != old => {
            patch.insert(key.clone(), diff(old, new));
          }
          Some(_) => {}
        }
      }
      for (key, new) in b {
        if !a.contains_key(key) {
          patch.insert(key.clone(), new.clone());
        }
      }
      Value::Object(patch)
    }
    _ => to.clone(),
  }
}

/// Apply a merge patch to `target` in place.
pub fn apply(target: &mut Value, patch: &Value) {
  let Value::Object(members) = patch else {
    *target = patch.clone();
    return;
  };
  if !target.is_object() {
    *target = Value::Object(Map::new());
  }
  if let Value::Object(object) = target {
    for (key, value) in members {
      if value.is_null() {
        object.remove(key);
      } else {
        apply(object.entry(key.clone()).or_insert(Value::Null), value);
      }
    }
  }
}

/// Parse `"<from>...<to>"`.
pub fn parse_range(raw: &str) -> Option<(i64, i64)> {
  let (from, to) = raw.split_once("...")?;
  Some((from.parse().ok()?, to.parse().ok()?))
}

fn parse_server(raw: &str) -> Result<Server, ApiError> {
  Server::parse(raw).map_err(|e| ApiError::invalid(e.to_string()))
}

#[derive(Serialize)]
pub struct LatestVersion {
  pub version: i64,
}

/// `GET /{server}/{realm}/latest`
pub async fn latest<S: QueryStore + 'static>(
  State(store): State<Arc<S>>,
  Path((server, realm)): Path<(String, String)>,
) -> Result<Json<LatestVersion>, ApiError> {
  let server = parse_server(&server)?;
  let version = store
    .latest_snapshot_version(server, &realm)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| ApiError::NotFound(format!("no snapshot for {server}/{realm}")))?;
  Ok(Json(LatestVersion { version }))
}

/// `GET /{server}/{realm}/patch/{from}...{to}`
pub async fn patch<S: QueryStore + 'static>(
  State(store): State<Arc<S>>,
  Path((server, realm, range)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
  let server = parse_server(&server)?;
  let (from, to) = parse_range(&range)
    .ok_or_else(|| ApiError::invalid(format!("malformed version range {range:?}")))?;
  if from == to {
    return Ok(StatusCode::NO_CONTENT.into_response());
  }

  let load = |version: i64| {
    let store = Arc::clone(&store);
    let realm = realm.clone();
    async move {
      store
        .snapshot(server, &realm, version)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::NotFound(format!("snapshot {version} not found")))
    }
  };
  let old = load(from).await?;
  let new = load(to).await?;

  let mut resp = Json(diff(&old, &new)).into_response();
  resp
    .headers_mut()
    .insert(header::CONTENT_TYPE, HeaderValue::from_static(MERGE_PATCH_CONTENT_TYPE));
  set_cache_headers(resp.headers_mut(), None, IMMUTABLE_MAX_AGE_SECS);
  Ok(resp)
}
