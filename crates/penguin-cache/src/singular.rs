//! A named slot holding one value.

use std::{
  future::Future,
  sync::atomic::{AtomicU64, Ordering},
  time::{Duration, Instant},
};

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::entry::Entry;

#[derive(Debug)]
pub struct Singular<T> {
  name:       String,
  slot:       RwLock<Option<Entry<T>>>,
  flight:     Mutex<()>,
  /// Bumped under the slot lock by every purge.
  generation: AtomicU64,
}

impl<T: Clone + Send + Sync> Singular<T> {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name:       name.into(),
      slot:       RwLock::new(None),
      flight:     Mutex::new(()),
      generation: AtomicU64::new(0),
    }
  }

  pub fn name(&self) -> &str { &self.name }

  /// The value, unless absent or expired. Never suspends.
  pub fn get(&self) -> Option<T> {
    self.slot.read().as_ref().and_then(|e| e.live(Instant::now()))
  }

  pub fn set(&self, value: T, ttl: Duration) {
    *self.slot.write() = Some(Entry::new(value, ttl));
  }

  pub fn delete(&self) {
    let mut slot = self.slot.write();
    self.generation.fetch_add(1, Ordering::AcqRel);
    slot.take();
  }

  /// Return the cached value or run `fill` to produce it. Concurrent callers
  /// that miss wait for one another, so `fill` runs at most once per miss.
  /// A failed fill caches nothing, and neither does a fill that a
  /// [`Singular::delete`] overtook.
  pub async fn mutex_get_set<F, Fut, E>(&self, fill: F, ttl: Duration) -> Result<T, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(v) = self.get() {
      return Ok(v);
    }
    let _guard = self.flight.lock().await;
    if let Some(v) = self.get() {
      return Ok(v);
    }
    tracing::debug!(cache = %self.name, "filling singular cache");
    let generation = self.generation.load(Ordering::Acquire);
    let value = fill().await?;
    let mut slot = self.slot.write();
    if self.generation.load(Ordering::Acquire) == generation {
      *slot = Some(Entry::new(value.clone(), ttl));
    } else {
      tracing::debug!(cache = %self.name, "purged during fill, not caching");
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
  fn set_get_delete() {
    let c = Singular::new("shimZones");
    assert_eq!(c.get(), None);
    c.set(1, TTL);
    assert_eq!(c.get(), Some(1));
    c.delete();
    assert_eq!(c.get(), None);
  }

  #[test]
  fn expired_values_are_not_served() {
    let c = Singular::new("x");
    c.set("v", Duration::ZERO);
    assert_eq!(c.get(), None);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_misses_fill_once() {
    let c = Arc::new(Singular::new("shimItems"));
    let fills = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
      .map(|_| {
        let c = Arc::clone(&c);
        let fills = Arc::clone(&fills);
        tokio::spawn(async move {
          c.mutex_get_set(
            || async {
              fills.fetch_add(1, Ordering::SeqCst);
              tokio::time::sleep(Duration::from_millis(50)).await;
              Ok::<_, Infallible>(42)
            },
            TTL,
          )
          .await
          .unwrap()
        })
      })
      .collect();

    for h in handles {
      assert_eq!(h.await.unwrap(), 42);
    }
    assert_eq!(fills.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn purge_during_fill_is_not_overwritten() {
    let c = Arc::new(Singular::new("shimStages"));
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let filler = {
      let c = Arc::clone(&c);
      tokio::spawn(async move {
        c.mutex_get_set(
          || async move {
            started_tx.send(()).unwrap();
            release_rx.await.unwrap();
            Ok::<_, Infallible>("stale")
          },
          TTL,
        )
        .await
        .unwrap()
      })
    };
    started_rx.await.unwrap();
    c.delete();
    release_tx.send(()).unwrap();

    assert_eq!(filler.await.unwrap(), "stale");
    assert_eq!(c.get(), None);
    let v = c.mutex_get_set(|| async { Ok::<_, Infallible>("fresh") }, TTL).await.unwrap();
    assert_eq!(v, "fresh");
    assert_eq!(c.get(), Some("fresh"));
  }

  #[tokio::test]
  async fn failed_fill_caches_nothing() {
    let c = Singular::<i32>::new("x");
    let r: Result<i32, &str> = c.mutex_get_set(|| async { Err("boom") }, TTL).await;
    assert_eq!(r, Err("boom"));
    assert_eq!(c.get(), None);
  }
}
