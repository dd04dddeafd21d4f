//! The `lastModifiedTime#key` sidecar.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, SubsecRound, Utc};

use crate::{Keyed, Registry};

/// Logical name of the sidecar cache.
pub const LAST_MODIFIED_NAME: &str = "lastModifiedTime#key";

/// When each cached response was last filled, keyed by
/// `"<cache name>:<cache key>"`.
///
/// Stamps are truncated to whole seconds since they are rendered as HTTP
/// dates.
#[derive(Clone)]
pub struct LastModified {
  stamps: Arc<Keyed<DateTime<Utc>>>,
  ttl:    Duration,
}

impl LastModified {
  /// Register the sidecar in `registry`. `ttl` should be at least as long as
  /// the longest-lived response cache it stamps.
  pub fn new(registry: &Registry, ttl: Duration) -> Self {
    Self { stamps: registry.keyed(LAST_MODIFIED_NAME), ttl }
  }

  fn slot(cache: &str, key: &str) -> String { format!("{cache}:{key}") }

  /// Record "now" for `(cache, key)` and return it.
  pub fn touch(&self, cache: &str, key: &str) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(0);
    self.stamps.set(&Self::slot(cache, key), now, self.ttl);
    now
  }

  /// The recorded stamp, or a fresh one if none is recorded.
  pub fn get_or_touch(&self, cache: &str, key: &str) -> DateTime<Utc> {
    self
      .stamps
      .get(&Self::slot(cache, key))
      .unwrap_or_else(|| self.touch(cache, key))
  }

  pub fn get(&self, cache: &str, key: &str) -> Option<DateTime<Utc>> {
    self.stamps.get(&Self::slot(cache, key))
  }
}
