//! Keyed mutual exclusion for the idempotency middleware.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::error::Result;

/// Held for as long as the lock on its key is held.
pub struct LockGuard {
  _inner: Box<dyn Send + Sync>,
}

impl LockGuard {
  pub fn new<G: Send + Sync + 'static>(inner: G) -> Self { Self { _inner: Box::new(inner) } }
}

#[async_trait]
pub trait Locker: Send + Sync {
  /// Wait until no other guard for `key` is alive.
  async fn lock(&self, key: &str) -> Result<LockGuard>;
}

/// Entries kept before idle locks are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// Process-local [`Locker`] over a map of async mutexes.
#[derive(Default)]
pub struct LocalLocker {
  locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LocalLocker {
  pub fn new() -> Self { Self::default() }

  fn slot(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self.locks.lock();
    if locks.len() >= PRUNE_THRESHOLD {
      locks.retain(|_, m| Arc::strong_count(m) > 1);
    }
    Arc::clone(locks.entry(key.to_owned()).or_default())
  }
}

#[async_trait]
impl Locker for LocalLocker {
  async fn lock(&self, key: &str) -> Result<LockGuard> {
    let guard: OwnedMutexGuard<()> = self.slot(key).lock_owned().await;
    Ok(LockGuard::new(guard))
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn same_key_waits() {
    let locker = Arc::new(LocalLocker::new());
    let guard = locker.lock("k").await.unwrap();

    let other = Arc::clone(&locker);
    let waiter = tokio::spawn(async move { other.lock("k").await.map(|_| ()) });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());

    drop(guard);
    tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap().unwrap();
  }

  #[tokio::test]
  async fn different_keys_are_independent() {
    let locker = LocalLocker::new();
    let _a = locker.lock("a").await.unwrap();
    let b = tokio::time::timeout(Duration::from_millis(100), locker.lock("b")).await;
    assert!(b.is_ok());
  }
}
