//! Storage traits and supporting query types.
//!
//! The traits are implemented by storage backends (e.g.
//! `penguin-store-sqlite`). Higher layers depend on these abstractions, not on
//! any concrete backend.
//!
//! - [`CatalogStore`]: stages, items, zones, accounts and other metadata
//!   shared by the read and write paths.
//! - [`ReportStore`]: everything the ingestion path reads and writes.
//! - [`QueryStore`]: the pre-aggregated element tables and the raw report
//!   scan used by personal and advanced queries.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::{collections::HashMap, future::Future};

use chrono::{DateTime, Utc};

use crate::{
  aggregate::{
    DropMatrixElement, PatternMatrixElement, ReportRow, SiteStats, TrendElement,
  },
  model::{Activity, DropInfo, Item, Notice, Server, SourceCategory, Stage, TimeRange, Zone},
  pattern::{CanonicalPattern, DropPattern, PatternElement},
  report::{Account, DropReport, DropReportExtra, RejectRule, ReportTask},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`QueryStore::report_rows`].
#[derive(Debug, Clone)]
pub struct ReportRowQuery {
  pub server:          Server,
  pub stage_ids:       Vec<i64>,
  /// Restrict to one account (personal queries).
  pub account_id:      Option<i64>,
  pub source_category: SourceCategory,
  /// Source names counted as [`SourceCategory::Automated`].
  pub automated:       Vec<String>,
  pub start:           DateTime<Utc>,
  pub end:             DateTime<Utc>,
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

pub trait CatalogStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn zones(&self) -> impl Future<Output = Result<Vec<Zone>, Self::Error>> + Send + '_;

  fn stages(&self) -> impl Future<Output = Result<Vec<Stage>, Self::Error>> + Send + '_;

  fn items(&self) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + '_;

  fn stage_by_ark_id<'a>(
    &'a self,
    ark_stage_id: &'a str,
  ) -> impl Future<Output = Result<Option<Stage>, Self::Error>> + Send + 'a;

  /// Resolve ark item ids to internal ids. Unknown ids are absent from the
  /// returned map.
  fn item_ids_by_ark_ids<'a>(
    &'a self,
    ark_item_ids: &'a [String],
  ) -> impl Future<Output = Result<HashMap<String, i64>, Self::Error>> + Send + 'a;

  fn time_ranges(
    &self,
    server: Server,
  ) -> impl Future<Output = Result<Vec<TimeRange>, Self::Error>> + Send + '_;

  /// All drop infos of `server`, across every range.
  fn drop_infos(
    &self,
    server: Server,
  ) -> impl Future<Output = Result<Vec<DropInfo>, Self::Error>> + Send + '_;

  fn activities(&self) -> impl Future<Output = Result<Vec<Activity>, Self::Error>> + Send + '_;

  fn notices(&self) -> impl Future<Output = Result<Vec<Notice>, Self::Error>> + Send + '_;

  /// A JSON document from the properties table (`formula`, `frontend_config`).
  fn property<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<serde_json::Value>, Self::Error>> + Send + 'a;

  fn account_by_penguin_id<'a>(
    &'a self,
    penguin_id: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

pub trait ReportStore: CatalogStore {
  fn account_exists(
    &self,
    account_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Insert an account with `penguin_id`. Returns `None` if the id is taken.
  fn create_account<'a>(
    &'a self,
    penguin_id: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  /// `true` if any stored report extra carries `md5`.
  fn md5_exists<'a>(
    &'a self,
    md5: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Drop infos of `(server, stage_id)` whose time range contains `at`.
  fn active_drop_infos(
    &self,
    server: Server,
    stage_id: i64,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DropInfo>, Self::Error>> + Send + '_;

  fn active_reject_rules(
    &self,
  ) -> impl Future<Output = Result<Vec<RejectRule>, Self::Error>> + Send + '_;

  /// Look a pattern up by hash, inserting it and its elements on a miss.
  /// The flag is `true` when the pattern was created.
  fn get_or_create_drop_pattern(
    &self,
    pattern: CanonicalPattern,
  ) -> impl Future<Output = Result<(DropPattern, bool), Self::Error>> + Send + '_;

  fn pattern_elements(
    &self,
    pattern_id: i64,
  ) -> impl Future<Output = Result<Vec<PatternElement>, Self::Error>> + Send + '_;

  /// Persist every report of `task` in one transaction, in report order.
  /// `reliabilities[i]` is stamped on report `i`. Returns the report ids.
  ///
  /// Idempotent per `task.task_id`: once a task has committed, persisting it
  /// again writes nothing and returns the ids of the first commit.
  fn persist_task<'a>(
    &'a self,
    task: &'a ReportTask,
    reliabilities: &'a [i32],
  ) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + 'a;

  fn drop_report(
    &self,
    report_id: i64,
  ) -> impl Future<Output = Result<Option<DropReport>, Self::Error>> + Send + '_;

  fn drop_report_extra(
    &self,
    report_id: i64,
  ) -> impl Future<Output = Result<Option<DropReportExtra>, Self::Error>> + Send + '_;

  /// Tombstone a report. Returns `false` if it does not exist or was already
  /// recalled.
  fn recall_report(
    &self,
    report_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

pub trait QueryStore: CatalogStore {
  fn drop_matrix_elements(
    &self,
    server: Server,
    source_category: SourceCategory,
  ) -> impl Future<Output = Result<Vec<DropMatrixElement>, Self::Error>> + Send + '_;

  /// For every stage, the elements of its most recently started range.
  fn latest_pattern_matrix_elements(
    &self,
    server: Server,
    source_category: SourceCategory,
  ) -> impl Future<Output = Result<Vec<PatternMatrixElement>, Self::Error>> + Send + '_;

  fn trend_elements(
    &self,
    server: Server,
  ) -> impl Future<Output = Result<Vec<TrendElement>, Self::Error>> + Send + '_;

  fn site_stats(
    &self,
    server: Server,
  ) -> impl Future<Output = Result<SiteStats, Self::Error>> + Send + '_;

  /// Item ids that may drop at `stage_id` during `range_id`.
  fn item_drop_set(
    &self,
    server: Server,
    stage_id: i64,
    range_id: i64,
  ) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;

  /// Trusted (`reliability = 0`) report rows matching `query`.
  fn report_rows<'a>(
    &'a self,
    query: &'a ReportRowQuery,
  ) -> impl Future<Output = Result<Vec<ReportRow>, Self::Error>> + Send + 'a;

  fn latest_snapshot_version<'a>(
    &'a self,
    server: Server,
    realm: &'a str,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  fn snapshot<'a>(
    &'a self,
    server: Server,
    realm: &'a str,
    version: i64,
  ) -> impl Future<Output = Result<Option<serde_json::Value>, Self::Error>> + Send + 'a;
}
