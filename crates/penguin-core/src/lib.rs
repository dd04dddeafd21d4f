//! Core types and trait definitions for the Penguin drop-statistics backend.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the domain model, drop-pattern canonicalization, the per-server game-day
//! calendar, identifier generation, and the traits implemented by storage
//! backends.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod error;
pub mod gameday;
pub mod ids;
pub mod kv;
pub mod model;
pub mod pattern;
pub mod report;
pub mod store;

pub use error::{Error, Result};
