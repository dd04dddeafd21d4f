//! SQLite backend for the Penguin drop-statistics store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. [`SqliteStore`] implements the core
//! store traits; [`SqliteKv`] implements the TTL key/value collaborator on a
//! table of the same database.

mod encode;
mod kv;
mod query;
mod schema;
mod seed;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use kv::SqliteKv;
pub use store::SqliteStore;
