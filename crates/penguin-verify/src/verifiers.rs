//! Built-in verifiers, in pipeline order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use penguin_core::{
  model::{Bounds, DropInfo, DropType},
  report::{Drop, Rejection, ReportTask, reliability},
  store::ReportStore,
};

use crate::{Context, Rule, pipeline::Verifier};

fn reject(reliability: i32, message: impl Into<String>) -> Option<Rejection> {
  Some(Rejection { reliability, message: message.into() })
}

// ─── User ────────────────────────────────────────────────────────────────────

/// Rejects tasks without a known account.
pub struct UserVerifier;

#[async_trait]
impl<S: ReportStore + 'static> Verifier<S> for UserVerifier {
  fn name(&self) -> &'static str { "user" }

  async fn verify(
    &self,
    store: &S,
    task: &ReportTask,
    _index: usize,
  ) -> Result<Option<Rejection>, S::Error> {
    if task.account_id == 0 {
      return Ok(reject(reliability::USER, "missing account"));
    }
    if !store.account_exists(task.account_id).await? {
      return Ok(reject(
        reliability::USER,
        format!("account {} does not exist", task.account_id),
      ));
    }
    Ok(None)
  }
}

// ─── MD5 ─────────────────────────────────────────────────────────────────────

/// Rejects screenshots that were already reported, either stored or earlier
/// in the same task.
pub struct Md5Verifier;

#[async_trait]
impl<S: ReportStore + 'static> Verifier<S> for Md5Verifier {
  fn name(&self) -> &'static str { "md5" }

  async fn verify(
    &self,
    store: &S,
    task: &ReportTask,
    index: usize,
  ) -> Result<Option<Rejection>, S::Error> {
    let Some(md5) = task.reports[index].metadata.md5() else {
      return Ok(None);
    };
    let repeated_in_task = task.reports[..index]
      .iter()
      .any(|r| r.metadata.md5() == Some(md5));
    if repeated_in_task || store.md5_exists(md5).await? {
      return Ok(reject(reliability::MD5, format!("md5 {md5} already reported")));
    }
    Ok(None)
  }
}

// ─── Drop shape ──────────────────────────────────────────────────────────────

/// Checks reported drops against the stage's drop infos active at the task's
/// creation time.
pub struct DropVerifier;

#[async_trait]
impl<S: ReportStore + 'static> Verifier<S> for DropVerifier {
  fn name(&self) -> &'static str { "drop" }

  async fn verify(
    &self,
    store: &S,
    task: &ReportTask,
    index: usize,
  ) -> Result<Option<Rejection>, S::Error> {
    let report = &task.reports[index];
    let Some(stage) = store.stage_by_ark_id(&report.ark_stage_id).await? else {
      return Ok(reject(
        reliability::DROP_SHAPE,
        format!("unknown stage {}", report.ark_stage_id),
      ));
    };
    // Taken at task creation, so a redelivery sees the same infos.
    let infos = store
      .active_drop_infos(task.server, stage.stage_id, task.created_at_utc())
      .await?;

    let problems = check_drops(&infos, &report.drops);
    if problems.is_empty() {
      Ok(None)
    } else {
      Ok(reject(reliability::DROP_SHAPE, problems.join("; ")))
    }
  }
}

fn out_of_bounds(bounds: &Bounds, n: i64) -> Option<String> {
  if bounds.admits(n) {
    None
  } else if bounds.exceptions.contains(&n) {
    Some(format!("{n} is an excluded count"))
  } else {
    Some(format!("{n} not in [{}, {}]", bounds.lower, bounds.upper))
  }
}

/// Every problem with `drops` under `infos`; empty when the drops fit.
///
/// `RECOGNITION_ONLY` infos are ignored. Type infos (no item) bound the number
/// of distinct items per drop type. Item infos whitelist `(item, type)` pairs
/// and bound the summed quantity of each.
pub fn check_drops(infos: &[DropInfo], drops: &[Drop]) -> Vec<String> {
  let infos = infos.iter().filter(|i| i.drop_type != DropType::RecognitionOnly);
  let (item_infos, type_infos): (Vec<&DropInfo>, Vec<&DropInfo>) =
    infos.partition(|i| i.item_id.is_some());

  let mut problems = Vec::new();

  // Type check.
  let mut distinct: BTreeMap<DropType, BTreeSet<i64>> = BTreeMap::new();
  for d in drops {
    distinct.entry(d.drop_type).or_default().insert(d.item_id);
  }
  for info in &type_infos {
    let Some(bounds) = &info.bounds else { continue };
    let count = distinct.get(&info.drop_type).map_or(0, |s| s.len() as i64);
    if let Some(why) = out_of_bounds(bounds, count) {
      problems.push(format!("{} item count: {why}", info.drop_type));
    }
  }

  // Item check.
  let allowed: HashMap<(i64, DropType), Option<&Bounds>> = item_infos
    .iter()
    .filter_map(|i| i.item_id.map(|item| ((item, i.drop_type), i.bounds.as_ref())))
    .collect();
  let mut sums: BTreeMap<(i64, DropType), i64> = BTreeMap::new();
  for d in drops {
    let key = (d.item_id, d.drop_type);
    if !allowed.contains_key(&key) {
      problems.push(format!("item {} may not drop as {}", d.item_id, d.drop_type));
    }
    *sums.entry(key).or_default() += d.quantity;
  }
  let mut bounded: Vec<_> = allowed.iter().collect();
  bounded.sort_by_key(|((item, ty), _)| (*item, *ty));
  for ((item, ty), bounds) in bounded {
    let Some(bounds) = bounds else { continue };
    let sum = sums.get(&(*item, *ty)).copied().unwrap_or(0);
    if let Some(why) = out_of_bounds(bounds, sum) {
      problems.push(format!("item {item} as {ty} quantity: {why}"));
    }
  }

  problems
}

// ─── Reject rules ────────────────────────────────────────────────────────────

/// Evaluates every active reject rule against `{Report, Task}`.
///
/// A matching rule stamps its own reliability. A rule that fails to compile
/// or evaluate is logged; if no rule matches, the report gets
/// [`reliability::REJECT_RULE_ERROR`].
pub struct RejectRuleVerifier;

#[async_trait]
impl<S: ReportStore + 'static> Verifier<S> for RejectRuleVerifier {
  fn name(&self) -> &'static str { "rejectRule" }

  async fn verify(
    &self,
    store: &S,
    task: &ReportTask,
    index: usize,
  ) -> Result<Option<Rejection>, S::Error> {
    let rules = store.active_reject_rules().await?;
    if rules.is_empty() {
      return Ok(None);
    }

    let ctx = Context::new()
      .with("Report", serde_json::to_value(&task.reports[index]).unwrap_or_default())
      .with("Task", serde_json::to_value(task).unwrap_or_default());

    let mut failed = None;
    for rule in &rules {
      match Rule::compile(&rule.expr).and_then(|r| r.matches(&ctx)) {
        Ok(true) => {
          return Ok(reject(rule.with_reliability, format!("matched reject rule {}", rule.rule_id)));
        }
        Ok(false) => {}
        Err(e) => {
          tracing::warn!(rule_id = rule.rule_id, error = %e, "reject rule failed to evaluate");
          failed.get_or_insert(rule.rule_id);
        }
      }
    }

    Ok(failed.map(|rule_id| Rejection {
      reliability: reliability::REJECT_RULE_ERROR,
      message:     format!("reject rule {rule_id} failed to evaluate"),
    }))
  }
}

#[cfg(test)]
mod tests {
  use penguin_core::model::Server;

  use super::*;

  fn info(item_id: Option<i64>, drop_type: DropType, lower: i64, upper: i64) -> DropInfo {
    DropInfo {
      drop_id: 0,
      server: Server::Cn,
      stage_id: 1,
      item_id,
      drop_type,
      range_id: 1,
      accumulable: true,
      bounds: Some(Bounds { lower, upper, exceptions: vec![] }),
    }
  }

  fn drop(drop_type: DropType, item_id: i64, quantity: i64) -> Drop {
    Drop { drop_type, item_id, quantity }
  }

  #[test]
  fn fitting_drops_pass() {
    let infos = [
      info(None, DropType::Regular, 1, 2),
      info(Some(30012), DropType::Regular, 0, 3),
      info(Some(30021), DropType::Regular, 0, 3),
    ];
    let drops = [drop(DropType::Regular, 30012, 1), drop(DropType::Regular, 30021, 2)];
    assert!(check_drops(&infos, &drops).is_empty());
  }

  #[test]
  fn unknown_item_type_pair_fails() {
    let infos = [info(Some(30012), DropType::Regular, 0, 3)];
    let problems = check_drops(&infos, &[drop(DropType::Special, 30012, 1)]);
    assert_eq!(problems, vec!["item 30012 may not drop as SPECIAL"]);
  }

  #[test]
  fn type_count_is_distinct_items() {
    let infos = [
      info(None, DropType::Extra, 0, 1),
      info(Some(1), DropType::Extra, 0, 5),
      info(Some(2), DropType::Extra, 0, 5),
    ];
    // The same item twice is one distinct item.
    assert!(check_drops(&infos, &[drop(DropType::Extra, 1, 1), drop(DropType::Extra, 1, 1)])
      .is_empty());
    let problems = check_drops(&infos, &[drop(DropType::Extra, 1, 1), drop(DropType::Extra, 2, 1)]);
    assert_eq!(problems, vec!["EXTRA item count: 2 not in [0, 1]"]);
  }

  #[test]
  fn item_quantities_are_summed_and_bounded() {
    let infos = [info(Some(1), DropType::Regular, 1, 2)];
    let problems = check_drops(&infos, &[drop(DropType::Regular, 1, 2), drop(DropType::Regular, 1, 1)]);
    assert_eq!(problems, vec!["item 1 as REGULAR quantity: 3 not in [1, 2]"]);
    // A guaranteed item that is missing violates its lower bound.
    assert_eq!(check_drops(&infos, &[]).len(), 1);
  }

  #[test]
  fn exceptions_are_reported() {
    let mut i = info(None, DropType::Regular, 0, 3);
    i.bounds = Some(Bounds { lower: 0, upper: 3, exceptions: vec![0] });
    assert_eq!(check_drops(&[i], &[]), vec!["REGULAR item count: 0 is an excluded count"]);
  }

  #[test]
  fn recognition_only_infos_are_ignored() {
    let infos = [
      info(Some(1), DropType::Regular, 0, 3),
      info(Some(9), DropType::RecognitionOnly, 1, 1),
    ];
    assert!(check_drops(&infos, &[drop(DropType::Regular, 1, 1)]).is_empty());
    assert_eq!(check_drops(&infos, &[drop(DropType::RecognitionOnly, 9, 1)]).len(), 1);
  }
}
