//! The ordered verifier chain.

use std::sync::Arc;

use async_trait::async_trait;
use penguin_core::{
  report::{Rejection, ReportTask, Violation, Violations},
  store::ReportStore,
};

use crate::verifiers::{DropVerifier, Md5Verifier, RejectRuleVerifier, UserVerifier};

/// One independent check over a single report of a task.
///
/// Returning `Ok(None)` passes the report on to the next verifier. Store
/// errors are returned as-is; the caller decides whether to retry the task.
#[async_trait]
pub trait Verifier<S>: Send + Sync
where
  S: ReportStore + 'static,
{
  /// Recorded as [`Violation::name`] when this verifier rejects.
  fn name(&self) -> &'static str;

  async fn verify(
    &self,
    store: &S,
    task: &ReportTask,
    index: usize,
  ) -> Result<Option<Rejection>, S::Error>;
}

pub struct Pipeline<S: ReportStore + 'static> {
  store:     Arc<S>,
  verifiers: Vec<Box<dyn Verifier<S>>>,
}

impl<S: ReportStore + 'static> Pipeline<S> {
  /// The built-in chain: `user`, `md5`, `drop`, `rejectRule`.
  pub fn new(store: Arc<S>) -> Self {
    Self::with_verifiers(store, vec![
      Box::new(UserVerifier),
      Box::new(Md5Verifier),
      Box::new(DropVerifier),
      Box::new(RejectRuleVerifier),
    ])
  }

  pub fn with_verifiers(store: Arc<S>, verifiers: Vec<Box<dyn Verifier<S>>>) -> Self {
    Self { store, verifiers }
  }

  pub fn names(&self) -> Vec<&'static str> { self.verifiers.iter().map(|v| v.name()).collect() }

  /// Run every report of `task` through the chain. The first rejection of
  /// each report is recorded under its index; later verifiers are skipped
  /// for that report.
  pub async fn verify(&self, task: &ReportTask) -> Result<Violations, S::Error> {
    let mut violations = Violations::new();
    for index in 0..task.reports.len() {
      for verifier in &self.verifiers {
        if let Some(rejection) = verifier.verify(self.store.as_ref(), task, index).await? {
          tracing::info!(
            task_id = %task.task_id,
            report_index = index,
            verifier = verifier.name(),
            reliability = rejection.reliability,
            message = %rejection.message,
            "report rejected",
          );
          violations.insert(index, Violation { name: verifier.name().to_owned(), rejection });
          break;
        }
      }
    }
    Ok(violations)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};
  use penguin_core::{
    model::{Bounds, DropInfo, DropType, Server, Stage, TimeRange, Zone},
    report::{Drop, RejectRule, ReportMetadata, RuleStatus, SingleReport, reliability},
  };
  use penguin_store_sqlite::SqliteStore;
  use serde_json::json;

  use super::*;

  async fn store() -> Arc<SqliteStore> {
    let s = SqliteStore::open_in_memory().await.unwrap();
    s.insert_zone(&Zone {
      zone_id:     1,
      ark_zone_id: "main_1".into(),
      index:       0,
      category:    "MAINLINE".into(),
      zone_type:   None,
      name:        "Episode 01".into(),
      name_i18n:   json!({}),
      existence:   Default::default(),
      background:  None,
    })
    .await
    .unwrap();
    s.insert_stage(&Stage {
      stage_id:           10,
      ark_stage_id:       "main_01-07".into(),
      zone_id:            1,
      stage_type:         "MAIN".into(),
      code:               "1-7".into(),
      code_i18n:          json!({}),
      sanity:             Some(6),
      existence:          Default::default(),
      min_clear_time:     None,
      extra_process_type: None,
    })
    .await
    .unwrap();
    s.insert_time_range(&TimeRange {
      range_id:   1,
      server:     Server::Cn,
      name:       None,
      start_time: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
      end_time:   Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
    })
    .await
    .unwrap();
    s.insert_drop_info(&DropInfo {
      drop_id:     1,
      server:      Server::Cn,
      stage_id:    10,
      item_id:     Some(30012),
      drop_type:   DropType::Regular,
      range_id:    1,
      accumulable: true,
      bounds:      Some(Bounds { lower: 0, upper: 5, exceptions: vec![] }),
    })
    .await
    .unwrap();
    s.create_account("000000001").await.unwrap();
    Arc::new(s)
  }

  fn report(drop_type: DropType, md5: Option<&str>) -> SingleReport {
    SingleReport {
      ark_stage_id: "main_01-07".into(),
      drops:        vec![Drop { drop_type, item_id: 30012, quantity: 1 }],
      times:        1,
      metadata:     ReportMetadata { md5: md5.map(str::to_owned), ..Default::default() },
    }
  }

  fn task(account_id: i64, reports: Vec<SingleReport>) -> ReportTask {
    ReportTask {
      task_id: "t".into(),
      created_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap().timestamp_micros(),
      server: Server::Cn,
      source: "frontend-v2".into(),
      version: "v3.0.0".into(),
      reports,
      account_id,
      ip: "127.0.0.1".into(),
    }
  }

  #[tokio::test]
  async fn default_chain_order() {
    let p = Pipeline::new(store().await);
    assert_eq!(p.names(), vec!["user", "md5", "drop", "rejectRule"]);
  }

  #[tokio::test]
  async fn clean_task_has_no_violations() {
    let p = Pipeline::new(store().await);
    let v = p.verify(&task(1, vec![report(DropType::Regular, None)])).await.unwrap();
    assert!(v.is_empty());
  }

  #[tokio::test]
  async fn unknown_account_rejects_every_report() {
    let p = Pipeline::new(store().await);
    let t = task(0, vec![report(DropType::Regular, None), report(DropType::Special, None)]);
    let v = p.verify(&t).await.unwrap();
    assert_eq!(v.len(), 2);
    // The first rejection wins even though report 1 also has a bad drop.
    assert_eq!(v[&1].name, "user");
    assert_eq!(v[&1].rejection.reliability, reliability::USER);
  }

  #[tokio::test]
  async fn drop_shape_violation_is_indexed() {
    let p = Pipeline::new(store().await);
    let t = task(1, vec![report(DropType::Regular, None), report(DropType::Special, None)]);
    let v = p.verify(&t).await.unwrap();
    assert_eq!(v.len(), 1);
    assert_eq!(v[&1].name, "drop");
    assert_eq!(v[&1].rejection.reliability, reliability::DROP_SHAPE);
  }

  #[tokio::test]
  async fn drop_infos_are_taken_at_task_creation() {
    let p = Pipeline::new(store().await);
    let mut t = task(1, vec![report(DropType::Regular, None)]);
    t.created_at = Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap().timestamp_micros();
    let v = p.verify(&t).await.unwrap();
    assert_eq!(v[&0].name, "drop");
    assert_eq!(v[&0].rejection.reliability, reliability::DROP_SHAPE);
  }

  #[tokio::test]
  async fn md5_repeated_within_a_task() {
    let p = Pipeline::new(store().await);
    let t = task(1, vec![
      report(DropType::Regular, Some("m")),
      report(DropType::Regular, Some("m")),
    ]);
    let v = p.verify(&t).await.unwrap();
    assert!(!v.contains_key(&0));
    assert_eq!(v[&1].name, "md5");
  }

  #[tokio::test]
  async fn reject_rules_match_and_fail() {
    let s = store().await;
    s.insert_reject_rule(&RejectRule {
      rule_id:          0,
      status:           RuleStatus::Active,
      expr:             "Task.source == 'frontend-v2' && Report.times >= 1".into(),
      with_reliability: 512,
    })
    .await
    .unwrap();
    let p = Pipeline::new(s.clone());
    let v = p.verify(&task(1, vec![report(DropType::Regular, None)])).await.unwrap();
    assert_eq!(v[&0].name, "rejectRule");
    assert_eq!(v[&0].rejection.reliability, 512);

    let broken = SqliteStore::open_in_memory().await.unwrap();
    broken.create_account("000000001").await.unwrap();
    broken
      .insert_reject_rule(&RejectRule {
        rule_id:          0,
        status:           RuleStatus::Active,
        expr:             "Report.times > 'x'".into(),
        with_reliability: 512,
      })
      .await
      .unwrap();
    let p = Pipeline::with_verifiers(Arc::new(broken), vec![Box::new(RejectRuleVerifier)]);
    let v = p.verify(&task(1, vec![report(DropType::Regular, None)])).await.unwrap();
    assert_eq!(v[&0].rejection.reliability, reliability::REJECT_RULE_ERROR);
  }
}
