//! Cache invalidation surface.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::caches::Caches;

#[derive(Debug, Clone, Deserialize)]
pub struct PurgePair {
  pub name: String,
  #[serde(default)]
  pub key:  Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurgeRequest {
  pub pairs: Vec<PurgePair>,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
  pub purged: usize,
}

/// `POST /_/admin/purge`. Unknown names are ignored; always succeeds.
pub async fn purge(
  State(caches): State<Arc<Caches>>,
  Json(request): Json<PurgeRequest>,
) -> Json<PurgeResponse> {
  let mut purged = 0;
  for pair in &request.pairs {
    let outcome = caches.registry.purge(&pair.name, pair.key.as_deref());
    tracing::info!(name = %pair.name, key = ?pair.key, ?outcome, "cache purge");
    if outcome != penguin_cache::Purged::Nothing {
      purged += 1;
    }
  }
  Json(PurgeResponse { purged })
}
