//! In-memory response caches for Penguin.
//!
//! - [`Singular`]: one named value.
//! - [`Keyed`]: a prefix-named family of values addressed by key.
//! - [`Registry`]: creates caches and invalidates them by logical name.
//! - [`LastModified`]: fill stamps backing HTTP `Last-Modified`.
//!
//! `get` never suspends. `mutex_get_set` suspends only on a miss, where it
//! guarantees a single fill per `(cache, key)` among concurrent callers.

mod entry;
mod flight;
mod keyed;
mod last_modified;
mod registry;
mod singular;

pub use flight::Flight;
pub use keyed::Keyed;
pub use last_modified::{LAST_MODIFIED_NAME, LastModified};
pub use registry::{Purged, Registry};
pub use singular::Singular;
