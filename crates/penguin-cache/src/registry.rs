//! Process-wide index of caches by logical name, used by the purge surface.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{Keyed, Singular};

type DeleteFn = Arc<dyn Fn() + Send + Sync>;
type DeleteKeyFn = Arc<dyn Fn(&str) + Send + Sync>;

struct KeyedOps {
  flush:  DeleteFn,
  delete: DeleteKeyFn,
}

/// What a [`Registry::purge`] call touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purged {
  SingularDeleted,
  KeyedFlushed,
  KeyDeleted,
  /// The name is not registered (or has no keyed cache for a keyed purge).
  Nothing,
}

/// Creates caches and remembers how to invalidate each of them.
///
/// The closures hold only their own cache, so the registry never forms a
/// cycle with the values it indexes.
#[derive(Default)]
pub struct Registry {
  singular: RwLock<HashMap<String, DeleteFn>>,
  keyed:    RwLock<HashMap<String, KeyedOps>>,
}

impl Registry {
  pub fn new() -> Self { Self::default() }

  /// Create and register a singular cache. Re-registering a name replaces
  /// the previous entry.
  pub fn singular<T>(&self, name: &str) -> Arc<Singular<T>>
  where
    T: Clone + Send + Sync + 'static,
  {
    let cache = Arc::new(Singular::new(name));
    let handle = Arc::clone(&cache);
    self
      .singular
      .write()
      .insert(name.to_owned(), Arc::new(move || handle.delete()));
    cache
  }

  /// Create and register a keyed cache under `name`, which is also its prefix.
  pub fn keyed<T>(&self, name: &str) -> Arc<Keyed<T>>
  where
    T: Clone + Send + Sync + 'static,
  {
    let cache = Arc::new(Keyed::new(name));
    let flush = Arc::clone(&cache);
    let delete = Arc::clone(&cache);
    self.keyed.write().insert(name.to_owned(), KeyedOps {
      flush:  Arc::new(move || flush.flush()),
      delete: Arc::new(move |key: &str| delete.delete(key)),
    });
    cache
  }

  /// Invalidate by logical name.
  ///
  /// With a key, delete that key from the keyed cache `name`. Without one,
  /// delete the singular cache `name` if there is one, else flush the keyed
  /// cache `name`. Unknown names are ignored.
  pub fn purge(&self, name: &str, key: Option<&str>) -> Purged {
    if let Some(key) = key {
      let delete = self.keyed.read().get(name).map(|ops| Arc::clone(&ops.delete));
      return match delete {
        Some(delete) => {
          delete(key);
          Purged::KeyDeleted
        }
        None => Purged::Nothing,
      };
    }

    let singular = self.singular.read().get(name).cloned();
    if let Some(delete) = singular {
      delete();
      return Purged::SingularDeleted;
    }
    let flush = self.keyed.read().get(name).map(|ops| Arc::clone(&ops.flush));
    match flush {
      Some(flush) => {
        flush();
        Purged::KeyedFlushed
      }
      None => Purged::Nothing,
    }
  }

  /// Every registered name, sorted.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self
      .singular
      .read()
      .keys()
      .chain(self.keyed.read().keys())
      .cloned()
      .collect();
    names.sort();
    names.dedup();
    names
  }
}
