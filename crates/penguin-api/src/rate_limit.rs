//! Per-client token buckets.

use std::{
  collections::HashMap,
  time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::ApiError;

/// `capacity` requests per `per_secs` seconds, refilled continuously.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RateLimitConfig {
  pub capacity: u32,
  pub per_secs: u64,
}

impl RateLimitConfig {
  fn refill_per_sec(&self) -> f64 {
    f64::from(self.capacity) / self.per_secs.max(1) as f64
  }
}

#[derive(Debug, Clone)]
struct Bucket {
  tokens:      f64,
  last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
  scope:   String,
  config:  RateLimitConfig,
  buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
  pub fn new(scope: &str, config: RateLimitConfig) -> Self {
    Self { scope: scope.to_owned(), config, buckets: Mutex::new(HashMap::new()) }
  }

  /// Take one token from `key`'s bucket.
  pub fn allow(&self, key: &str) -> bool { self.allow_at(key, Instant::now()) }

  fn allow_at(&self, key: &str, now: Instant) -> bool {
    let capacity = f64::from(self.config.capacity);
    let mut buckets = self.buckets.lock();
    let bucket = buckets.entry(key.to_owned()).or_insert_with(|| Bucket {
      tokens:      capacity,
      last_refill: now,
    });
    let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
    bucket.last_refill = now;
    bucket.tokens = (bucket.tokens + elapsed * self.config.refill_per_sec()).min(capacity);
    if bucket.tokens >= 1.0 {
      bucket.tokens -= 1.0;
      true
    } else {
      false
    }
  }

  /// [`allow`](Self::allow), as a handler guard.
  pub fn check(&self, key: &str) -> Result<(), ApiError> {
    if self.allow(key) {
      Ok(())
    } else {
      tracing::info!(scope = %self.scope, client = key, "rate limited");
      Err(ApiError::TooManyRequests)
    }
  }

  /// Forget buckets that have been full for at least one window.
  pub fn sweep(&self) { self.sweep_at(Instant::now()) }

  fn sweep_at(&self, now: Instant) {
    let window = Duration::from_secs(self.config.per_secs);
    let mut buckets = self.buckets.lock();
    let before = buckets.len();
    buckets.retain(|_, b| now.saturating_duration_since(b.last_refill) < window);
    if buckets.len() < before {
      tracing::debug!(scope = %self.scope, removed = before - buckets.len(), "limiter swept");
    }
  }

  /// Number of clients with a bucket.
  pub fn tracked(&self) -> usize { self.buckets.lock().len() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn limiter(capacity: u32, per_secs: u64) -> RateLimiter {
    RateLimiter::new("test", RateLimitConfig { capacity, per_secs })
  }

  #[test]
  fn capacity_is_enforced_per_key() {
    let l = limiter(30, 300);
    let now = Instant::now();
    for _ in 0..30 {
      assert!(l.allow_at("1.2.3.4", now));
    }
    assert!(!l.allow_at("1.2.3.4", now));
    assert!(l.allow_at("5.6.7.8", now));
  }

  #[test]
  fn tokens_refill_over_time() {
    let l = limiter(2, 2);
    let now = Instant::now();
    assert!(l.allow_at("a", now));
    assert!(l.allow_at("a", now));
    assert!(!l.allow_at("a", now));
    assert!(l.allow_at("a", now + Duration::from_secs(1)));
    assert!(!l.allow_at("a", now + Duration::from_secs(1)));
  }

  #[test]
  fn sweep_forgets_idle_clients() {
    let l = limiter(5, 60);
    let now = Instant::now();
    assert!(l.allow_at("idle", now));
    assert!(l.allow_at("busy", now + Duration::from_secs(50)));
    assert_eq!(l.tracked(), 2);

    l.sweep_at(now + Duration::from_secs(70));
    assert_eq!(l.tracked(), 1);
    l.sweep_at(now + Duration::from_secs(120));
    assert_eq!(l.tracked(), 0);
  }

  #[test]
  fn check_maps_to_too_many_requests() {
    let l = limiter(1, 60);
    assert!(l.check("a").is_ok());
    assert!(matches!(l.check("a"), Err(ApiError::TooManyRequests)));
  }
}
