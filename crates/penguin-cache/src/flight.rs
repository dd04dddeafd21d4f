//! Per-key fill locks.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of per-key async mutexes. Holding the guard for a key serialises
/// every other [`Flight::acquire`] of the same key; different keys never
/// contend beyond the short map lookup.
#[derive(Debug, Default)]
pub struct Flight {
  inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Flight {
  pub fn new() -> Self { Self::default() }

  pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
    let lock = {
      let mut inflight = self.inflight.lock().await;
      // Entries only the map still references are idle.
      inflight.retain(|_, m| Arc::strong_count(m) > 1);
      Arc::clone(
        inflight
          .entry(key.to_owned())
          .or_insert_with(|| Arc::new(Mutex::new(()))),
      )
    };
    lock.lock_owned().await
  }

  /// Keys with a live lock (held or waited on).
  pub async fn active(&self) -> usize {
    self
      .inflight
      .lock()
      .await
      .values()
      .filter(|m| Arc::strong_count(m) > 1)
      .count()
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn same_key_is_serialised() {
    let flight = Arc::new(Flight::new());
    let guard = flight.acquire("k").await;

    let f = Arc::clone(&flight);
    let waiter = tokio::spawn(async move {
      let _g = f.acquire("k").await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    drop(guard);
    waiter.await.unwrap();
  }

  #[tokio::test]
  async fn different_keys_do_not_block() {
    let flight = Flight::new();
    let _a = flight.acquire("a").await;
    let _b = tokio::time::timeout(Duration::from_millis(100), flight.acquire("b"))
      .await
      .unwrap();
    assert_eq!(flight.active().await, 2);
  }

  #[tokio::test]
  async fn released_keys_are_pruned() {
    let flight = Flight::new();
    drop(flight.acquire("a").await);
    drop(flight.acquire("b").await);
    assert_eq!(flight.active().await, 0);
    assert!(flight.inflight.lock().await.len() <= 1);
  }
}
