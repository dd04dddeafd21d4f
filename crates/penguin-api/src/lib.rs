//! Read-side JSON API for Penguin.
//!
//! Exposes axum [`Router`]s backed by any [`penguin_core::store::QueryStore`]:
//!
//! - [`api_router`]: the v2 shim endpoints (results, catalog, advanced
//!   queries, login), served through the [`Caches`].
//! - [`incremental_router`]: versioned snapshots as merge patches.
//! - [`admin_router`]: cache purge.
//!
//! Auth, timeouts and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! Router::new()
//!   .nest("/PenguinStats/api/v2", penguin_api::api_router(state.clone()))
//!   .nest("/api/v3/incremental", penguin_api::incremental_router(store.clone()))
//!   .nest("/api/_/admin", penguin_api::admin_router(caches.clone()))
//! ```

pub mod admin;
pub mod advanced;
pub mod caches;
pub mod catalog;
pub mod compute;
pub mod error;
pub mod headers;
pub mod identity;
pub mod incremental;
pub mod params;
pub mod rate_limit;
pub mod results;
pub mod shim;
pub mod state;
pub mod users;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use penguin_core::store::QueryStore;

pub use caches::Caches;
pub use error::{ApiError, FieldViolation};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use state::{ApiConfig, ApiState};

/// Build the v2 shim router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: QueryStore + 'static,
{
  Router::new()
    // Results
    .route("/result/matrix", get(results::matrix::<S>))
    .route("/result/pattern", get(results::pattern::<S>))
    .route("/result/trends", get(results::trends::<S>))
    .route("/advanced", post(advanced::handler::<S>))
    .route("/stats", get(results::stats::<S>))
    // Catalog
    .route("/items", get(catalog::items::<S>))
    .route("/items/{ark_item_id}", get(catalog::item::<S>))
    .route("/zones", get(catalog::zones::<S>))
    .route("/zones/{ark_zone_id}", get(catalog::zone::<S>))
    .route("/stages", get(catalog::stages::<S>))
    .route("/stages/{ark_stage_id}", get(catalog::stage::<S>))
    .route("/period", get(catalog::period::<S>))
    .route("/notice", get(catalog::notice::<S>))
    .route("/formula", get(catalog::formula::<S>))
    .route("/config", get(catalog::frontend_config::<S>))
    // Accounts
    .route("/users", post(users::login::<S>))
    .with_state(state)
}

/// Build the incremental snapshot router.
pub fn incremental_router<S>(store: Arc<S>) -> Router<()>
where
  S: QueryStore + 'static,
{
  Router::new()
    .route("/{server}/{realm}/latest", get(incremental::latest::<S>))
    .route("/{server}/{realm}/patch/{range}", get(incremental::patch::<S>))
    .with_state(store)
}

/// Build the cache administration router.
pub fn admin_router(caches: Arc<Caches>) -> Router<()> {
  Router::new()
    .route("/purge", post(admin::purge))
    .with_state(caches)
}

// ─── Integration tests ────────────────────────────────────────────────────────
