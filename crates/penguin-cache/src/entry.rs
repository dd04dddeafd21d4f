use std::time::{Duration, Instant};

/// A cached value and the instant it stops being served.
#[derive(Debug, Clone)]
pub(crate) struct Entry<T> {
  pub(crate) value:      T,
  pub(crate) expires_at: Instant,
}

impl<T: Clone> Entry<T> {
  pub(crate) fn new(value: T, ttl: Duration) -> Self {
    let now = Instant::now();
    // TTLs are capped at one year.
    let ttl = ttl.min(Duration::from_secs(365 * 24 * 60 * 60));
    Self { value, expires_at: now + ttl }
  }

  pub(crate) fn live(&self, now: Instant) -> Option<T> {
    (self.expires_at > now).then(|| self.value.clone())
  }
}
