//! Ingestion types: the task that travels over the queue, the rows it turns
//! into, and the verdicts the verification pipeline attaches to it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DropType, Server};

// ─── Reliability ─────────────────────────────────────────────────────────────

/// Reliability codes stored on `drop_reports`.
pub mod reliability {
  /// Trusted; counted by aggregation.
  pub const OK: i32 = 0;
  /// Recalled by its submitter; excluded from everything.
  pub const RECALLED: i32 = -1;
  /// Missing or unknown account.
  pub const USER: i32 = 4;
  /// Screenshot md5 already reported.
  pub const MD5: i32 = 5;
  /// Drops do not fit the stage's active drop infos.
  pub const DROP_SHAPE: i32 = 6;
  /// A reject rule failed to evaluate.
  pub const REJECT_RULE_ERROR: i32 = 7;
}

// ─── Task ────────────────────────────────────────────────────────────────────

/// One drop, already remapped to internal ids and buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drop {
  pub drop_type: DropType,
  pub item_id:   i64,
  pub quantity:  i64,
}

/// Client-side provenance of a recognized screenshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportMetadata {
  pub fingerprint:               Option<String>,
  pub md5:                       Option<String>,
  pub file_name:                 Option<String>,
  /// Epoch milliseconds of the screenshot file.
  pub last_modified:             Option<i64>,
  pub recognizer_version:        Option<String>,
  pub recognizer_assets_version: Option<String>,
}

impl ReportMetadata {
  /// The md5 if present and non-empty.
  pub fn md5(&self) -> Option<&str> {
    self.md5.as_deref().filter(|m| !m.is_empty())
  }
}

/// A single stage clear inside a [`ReportTask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleReport {
  pub ark_stage_id: String,
  pub drops:        Vec<Drop>,
  pub times:        i64,
  #[serde(default)]
  pub metadata:     ReportMetadata,
}

/// The unit of work published to the queue bus by the ingestion front-end and
/// consumed by the ingestion worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTask {
  pub task_id:    String,
  /// Epoch microseconds.
  pub created_at: i64,
  pub server:     Server,
  pub source:     String,
  pub version:    String,
  pub reports:    Vec<SingleReport>,
  pub account_id: i64,
  pub ip:         String,
}

impl ReportTask {
  pub fn created_at_utc(&self) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(self.created_at).unwrap_or_default()
  }
}

// ─── Persisted rows ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropReport {
  pub report_id:   i64,
  pub stage_id:    i64,
  pub pattern_id:  i64,
  pub times:       i64,
  pub created_at:  DateTime<Utc>,
  pub reliability: i32,
  pub server:      Server,
  pub account_id:  i64,
  pub source_name: String,
  pub version:     String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropReportExtra {
  pub report_id:   i64,
  pub ip:          String,
  pub source_name: String,
  pub version:     String,
  pub metadata:    ReportMetadata,
  pub md5:         Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
  pub account_id: i64,
  /// Zero-padded 9-digit public identifier.
  pub penguin_id: String,
  pub weight:     f64,
  pub created_at: DateTime<Utc>,
}

// ─── Reject rules ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
  Active,
  Inactive,
}

/// A predicate over `{Report, Task}`; a match stamps `with_reliability` on the
/// report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectRule {
  pub rule_id:          i64,
  pub status:           RuleStatus,
  pub expr:             String,
  pub with_reliability: i32,
}

// ─── Verdicts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
  pub reliability: i32,
  pub message:     String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
  /// Name of the verifier that produced the rejection.
  pub name:      String,
  pub rejection: Rejection,
}

/// First rejection per report, keyed by the report's index in its task.
pub type Violations = BTreeMap<usize, Violation>;

/// Reliability for each report of a task, in report order.
pub fn reliabilities(violations: &Violations, report_count: usize) -> Vec<i32> {
  (0..report_count)
    .map(|i| {
      violations
        .get(&i)
        .map_or(reliability::OK, |v| v.rejection.reliability)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reports_without_violations_are_trusted() {
    let mut violations = Violations::new();
    violations.insert(1, Violation {
      name:      "drop".into(),
      rejection: Rejection {
        reliability: reliability::DROP_SHAPE,
        message:     "bad".into(),
      },
    });
    assert_eq!(reliabilities(&violations, 3), vec![0, 6, 0]);
  }

  #[test]
  fn empty_md5_counts_as_absent() {
    let meta = ReportMetadata { md5: Some(String::new()), ..Default::default() };
    assert_eq!(meta.md5(), None);
  }
}
