//! Shared state of the read-side handlers.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
  caches::Caches,
  rate_limit::{RateLimitConfig, RateLimiter},
};

/// Source names counted as automated when none are configured.
pub const DEFAULT_AUTOMATED_SOURCES: [&str; 3] =
  ["MeoAssistant", "MaaAssistantArknights", "frontend-v2-recognition"];

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub automated_sources:   Vec<String>,
  pub advanced_rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      automated_sources:   DEFAULT_AUTOMATED_SOURCES.iter().map(|s| (*s).to_owned()).collect(),
      advanced_rate_limit: RateLimitConfig { capacity: 30, per_secs: 300 },
    }
  }
}

/// Shared state threaded through all read-side handlers.
pub struct ApiState<S> {
  pub store:             Arc<S>,
  pub caches:            Arc<Caches>,
  pub advanced_limiter:  Arc<RateLimiter>,
  pub automated_sources: Arc<Vec<String>>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:             Arc::clone(&self.store),
      caches:            Arc::clone(&self.caches),
      advanced_limiter:  Arc::clone(&self.advanced_limiter),
      automated_sources: Arc::clone(&self.automated_sources),
    }
  }
}

impl<S> ApiState<S> {
  pub fn new(store: Arc<S>, caches: Arc<Caches>, config: ApiConfig) -> Self {
    Self {
      store,
      caches,
      advanced_limiter: Arc::new(RateLimiter::new("advanced", config.advanced_rate_limit)),
      automated_sources: Arc::new(config.automated_sources),
    }
  }
}
