//! The shim response caches, one per logical name.

use std::{future::Future, sync::Arc, time::Duration};

use penguin_cache::{Keyed, LastModified, Registry, Singular};

use crate::{
  headers::Cached,
  shim::{
    ActivityShim, DropMatrixResult, ItemShim, PatternMatrixResult, SiteStatsShim, StageShim,
    TrendResult, ZoneShim,
  },
};

/// Lifetime of cached aggregate results.
pub const AGGREGATE_TTL: Duration = Duration::from_secs(5 * 60);
/// Lifetime of cached catalog shims.
pub const CATALOG_TTL: Duration = Duration::from_secs(60 * 60);
const LAST_MODIFIED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Caches {
  pub registry:              Registry,
  pub last_modified:         LastModified,
  pub global_drop_matrix:    Arc<Keyed<DropMatrixResult>>,
  pub latest_pattern_matrix: Arc<Keyed<PatternMatrixResult>>,
  pub saved_trends:          Arc<Keyed<TrendResult>>,
  pub site_stats:            Arc<Keyed<SiteStatsShim>>,
  pub stages:                Arc<Keyed<Vec<StageShim>>>,
  pub stage:                 Arc<Keyed<StageShim>>,
  pub zones:                 Arc<Singular<Vec<ZoneShim>>>,
  pub zone:                  Arc<Keyed<ZoneShim>>,
  pub items:                 Arc<Singular<Vec<ItemShim>>>,
  pub item:                  Arc<Keyed<ItemShim>>,
  pub activities:            Arc<Singular<Vec<ActivityShim>>>,
  pub item_drop_set:         Arc<Keyed<Vec<i64>>>,
}

impl Default for Caches {
  fn default() -> Self { Self::new() }
}

impl Caches {
  pub fn new() -> Self {
    let registry = Registry::new();
    Self {
      last_modified:         LastModified::new(&registry, LAST_MODIFIED_TTL),
      global_drop_matrix:    registry
        .keyed("shimGlobalDropMatrix#server|showClosedZones|sourceCategory"),
      latest_pattern_matrix: registry.keyed("shimLatestPatternMatrixResults#server|sourceCategory"),
      saved_trends:          registry.keyed("shimSavedTrendResults#server"),
      site_stats:            registry.keyed("shimSiteStats#server"),
      stages:                registry.keyed("shimStages#server"),
      stage:                 registry.keyed("shimStage#server|arkStageId"),
      zones:                 registry.singular("shimZones"),
      zone:                  registry.keyed("shimZone#arkZoneId"),
      items:                 registry.singular("shimItems"),
      item:                  registry.keyed("shimItem#arkItemId"),
      activities:            registry.singular("shimActivities"),
      item_drop_set:         registry.keyed("itemDropSet#server|stageId|rangeId"),
      registry,
    }
  }

  /// Serve `key` from `cache`, filling it with `fill` on a miss and stamping
  /// the fill time for `Last-Modified`.
  pub async fn keyed<T, F, Fut, E>(
    &self,
    cache: &Keyed<T>,
    key: &str,
    ttl: Duration,
    fill: F,
  ) -> Result<Cached<T>, E>
  where
    T: Clone + Send + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let name = cache.prefix();
    let value = cache
      .mutex_get_set(
        key,
        move || async move {
          let value = fill().await?;
          self.last_modified.touch(name, key);
          Ok(value)
        },
        ttl,
      )
      .await?;
    Ok(Cached::shim(value, self.last_modified.get_or_touch(name, key)))
  }

  /// [`keyed`](Self::keyed) for singular caches.
  pub async fn singular<T, F, Fut, E>(
    &self,
    cache: &Singular<T>,
    ttl: Duration,
    fill: F,
  ) -> Result<Cached<T>, E>
  where
    T: Clone + Send + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let name = cache.name();
    let value = cache
      .mutex_get_set(
        move || async move {
          let value = fill().await?;
          self.last_modified.touch(name, "");
          Ok(value)
        },
        ttl,
      )
      .await?;
    Ok(Cached::shim(value, self.last_modified.get_or_touch(name, "")))
  }
}
