//! Rows of the pre-aggregated element tables and of the raw report scan used
//! for personal and advanced queries.
//!
//! Element tables are written by offline aggregation jobs; this crate only
//! reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pattern::PatternElement;

/// Per `(stage, item, range)` drop totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropMatrixElement {
  pub stage_id:         i64,
  pub item_id:          i64,
  pub range_id:         i64,
  pub start_time:       DateTime<Utc>,
  pub end_time:         DateTime<Utc>,
  pub quantity:         i64,
  pub times:            i64,
  /// Histogram of per-clear quantities, as stored by the aggregation job.
  pub quantity_buckets: serde_json::Value,
}

/// Per `(stage, pattern, range)` totals with the pattern's elements attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatrixElement {
  pub stage_id:   i64,
  pub pattern_id: i64,
  pub range_id:   i64,
  pub start_time: DateTime<Utc>,
  pub end_time:   DateTime<Utc>,
  pub quantity:   i64,
  pub times:      i64,
  pub drops:      Vec<PatternElement>,
}

/// One section of a saved trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendElement {
  pub stage_id:   i64,
  pub item_id:    i64,
  /// Zero-based section index within the trend.
  pub group_id:   i64,
  pub start_time: DateTime<Utc>,
  pub end_time:   DateTime<Utc>,
  pub quantity:   i64,
  pub times:      i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimes {
  pub stage_id: i64,
  pub times:    i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantity {
  pub item_id:  i64,
  pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStats {
  pub total_sanity_cost:     i64,
  pub total_stage_times:     Vec<StageTimes>,
  pub total_item_quantities: Vec<ItemQuantity>,
}

/// One `(report, item)` pair from the raw report tables. A report whose
/// pattern is empty yields a single row with `item_id = None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
  pub report_id:  i64,
  pub stage_id:   i64,
  pub times:      i64,
  pub created_at: DateTime<Utc>,
  pub item_id:    Option<i64>,
  pub quantity:   i64,
}
