//! A prefix-named family of keyed slots.

use std::{
  collections::HashMap,
  future::Future,
  sync::atomic::{AtomicU64, Ordering},
  time::{Duration, Instant},
};

use parking_lot::RwLock;

use crate::{entry::Entry, flight::Flight};

#[derive(Debug)]
pub struct Keyed<T> {
  prefix:     String,
  entries:    RwLock<HashMap<String, Entry<T>>>,
  flight:     Flight,
  /// Bumped under the entries lock by every delete and flush.
  generation: AtomicU64,
}

impl<T: Clone + Send + Sync> Keyed<T> {
  pub fn new(prefix: impl Into<String>) -> Self {
    Self {
      prefix:     prefix.into(),
      entries:    RwLock::new(HashMap::new()),
      flight:     Flight::new(),
      generation: AtomicU64::new(0),
    }
  }

  pub fn prefix(&self) -> &str { &self.prefix }

  pub fn get(&self, key: &str) -> Option<T> {
    self
      .entries
      .read()
      .get(key)
      .and_then(|e| e.live(Instant::now()))
  }

  pub fn set(&self, key: &str, value: T, ttl: Duration) {
    self.set_unless_purged(key, value, ttl, None);
  }

  /// Store `value` unless the generation has moved past `generation`.
  fn set_unless_purged(&self, key: &str, value: T, ttl: Duration, generation: Option<u64>) -> bool {
    let mut entries = self.entries.write();
    if generation.is_some_and(|g| g != self.generation.load(Ordering::Acquire)) {
      return false;
    }
    let now = Instant::now();
    entries.retain(|_, e| e.expires_at > now);
    entries.insert(key.to_owned(), Entry::new(value, ttl));
    true
  }

  pub fn delete(&self, key: &str) {
    let mut entries = self.entries.write();
    self.generation.fetch_add(1, Ordering::AcqRel);
    entries.remove(key);
  }

  /// Drop every key under this prefix.
  pub fn flush(&self) {
    let mut entries = self.entries.write();
    self.generation.fetch_add(1, Ordering::AcqRel);
    entries.clear();
  }

  /// Live and expired-but-unswept entries.
  pub fn len(&self) -> usize { self.entries.read().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Keyed counterpart of [`crate::Singular::mutex_get_set`]: misses on the
  /// same key share one `fill`; misses on different keys fill in parallel.
  /// A delete or flush that lands while `fill` runs keeps its result out of
  /// the cache.
  pub async fn mutex_get_set<F, Fut, E>(&self, key: &str, fill: F, ttl: Duration) -> Result<T, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(v) = self.get(key) {
      return Ok(v);
    }
    let _guard = self.flight.acquire(key).await;
    if let Some(v) = self.get(key) {
      return Ok(v);
    }
    tracing::debug!(cache = %self.prefix, key, "filling keyed cache");
    let generation = self.generation.load(Ordering::Acquire);
    let value = fill().await?;
    if !self.set_unless_purged(key, value.clone(), ttl, Some(generation)) {
      tracing::debug!(cache = %self.prefix, key, "purged during fill, not caching");
    }
    Ok(value)
  }
}

#[cfg(test)]
mod tests {
  use std::{
    convert::Infallible,
    sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
    },
  };

  use super::*;

  const TTL: Duration = Duration::from_secs(60);

  #[test]
  fn keys_are_independent() {
    let c = Keyed::new("shimStage#server|arkStageId");
    c.set("CN|main_01-07", 1, TTL);
    c.set("US|main_01-07", 2, TTL);
    assert_eq!(c.get("CN|main_01-07"), Some(1));
    c.delete("CN|main_01-07");
    assert_eq!(c.get("CN|main_01-07"), None);
    assert_eq!(c.get("US|main_01-07"), Some(2));
    c.flush();
    assert!(c.is_empty());
  }

  #[test]
  fn expired_entries_are_swept_on_write() {
    let c = Keyed::new("x");
    c.set("a", 1, Duration::ZERO);
    c.set("b", 2, TTL);
    assert_eq!(c.len(), 1);
  }

  #[tokio::test]
  async fn flush_during_fill_is_not_overwritten() {
    let c = Arc::new(Keyed::new("shimGlobalDropMatrix#server|showClosedZoneStages|stageFilter|itemFilter"));
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let filler = {
      let c = Arc::clone(&c);
      tokio::spawn(async move {
        c.mutex_get_set(
          "CN|false||",
          || async move {
            started_tx.send(()).unwrap();
            release_rx.await.unwrap();
            Ok::<_, Infallible>(1)
          },
          TTL,
        )
        .await
        .unwrap()
      })
    };
    started_rx.await.unwrap();
    c.flush();
    release_tx.send(()).unwrap();

    assert_eq!(filler.await.unwrap(), 1);
    assert_eq!(c.get("CN|false||"), None);
    let v = c.mutex_get_set("CN|false||", || async { Ok::<_, Infallible>(2) }, TTL).await.unwrap();
    assert_eq!(v, 2);
    assert_eq!(c.get("CN|false||"), Some(2));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn fills_once_per_key() {
    let c = Arc::new(Keyed::new("shimSiteStats#server"));
    let fills = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..24)
      .map(|i| {
        let c = Arc::clone(&c);
        let fills = Arc::clone(&fills);
        let key = if i % 2 == 0 { "CN" } else { "US" };
        tokio::spawn(async move {
          c.mutex_get_set(
            key,
            || async {
              fills.fetch_add(1, Ordering::SeqCst);
              tokio::time::sleep(Duration::from_millis(50)).await;
              Ok::<_, Infallible>(key.to_owned())
            },
            TTL,
          )
          .await
          .unwrap()
        })
      })
      .collect();

    for (i, h) in handles.into_iter().enumerate() {
      let expected = if i % 2 == 0 { "CN" } else { "US" };
      assert_eq!(h.await.unwrap(), expected);
    }
    assert_eq!(fills.load(Ordering::SeqCst), 2);
  }
}
