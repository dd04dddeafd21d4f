//! On-the-fly aggregation of raw report rows, for personal and advanced
//! queries that no element table covers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use penguin_core::{
  aggregate::ReportRow,
  gameday::game_day_start,
  model::Server,
  pattern::canonicalize,
};

use crate::{
  error::ApiError,
  shim::{Catalog, ItemTrend, MatrixEntry, PatternDrop, PatternDrops, PatternEntry, StageTrend, TrendResult},
};

pub const HOUR_MS: i64 = 60 * 60 * 1000;
/// Upper bound on trend sections per query.
pub const MAX_SECTIONS: i64 = 360;

/// Total `times` per stage, counting each report once.
fn stage_times(rows: &[ReportRow]) -> HashMap<i64, i64> {
  let mut seen = HashSet::new();
  let mut times = HashMap::new();
  for row in rows {
    if seen.insert(row.report_id) {
      *times.entry(row.stage_id).or_default() += row.times;
    }
  }
  times
}

/// Drop matrix over `rows`. `expected` lists, per stage, items that get an
/// entry even when nothing of them was reported.
pub fn drop_matrix(
  rows: &[ReportRow],
  catalog: &Catalog,
  expected: &BTreeMap<i64, BTreeSet<i64>>,
  items: Option<&HashSet<i64>>,
  start: i64,
  end: Option<i64>,
) -> Vec<MatrixEntry> {
  let times = stage_times(rows);
  let mut quantities: BTreeMap<(i64, i64), i64> = BTreeMap::new();
  for (stage_id, item_ids) in expected {
    for &item_id in item_ids {
      quantities.entry((*stage_id, item_id)).or_default();
    }
  }
  for row in rows {
    if let Some(item_id) = row.item_id {
      *quantities.entry((row.stage_id, item_id)).or_default() += row.quantity;
    }
  }

  quantities
    .into_iter()
    .filter(|((_, item_id), _)| items.is_none_or(|set| set.contains(item_id)))
    .filter_map(|((stage_id, item_id), quantity)| {
      Some(MatrixEntry {
        stage_id: catalog.stage_ark(stage_id)?.to_owned(),
        item_id: catalog.item_ark(item_id)?.to_owned(),
        quantity,
        times: times.get(&stage_id).copied().unwrap_or_default(),
        start,
        end,
      })
    })
    .collect()
}

/// Pattern matrix over `rows`: how often each canonical pattern occurred per
/// stage.
pub fn pattern_matrix(
  rows: &[ReportRow],
  catalog: &Catalog,
  start: i64,
  end: Option<i64>,
) -> Vec<PatternEntry> {
  let times = stage_times(rows);

  // report_id → (stage_id, drops)
  let mut reports: BTreeMap<i64, (i64, Vec<(i64, i64)>)> = BTreeMap::new();
  for row in rows {
    let report = reports.entry(row.report_id).or_insert_with(|| (row.stage_id, Vec::new()));
    if let Some(item_id) = row.item_id {
      report.1.push((item_id, row.quantity));
    }
  }

  let mut counts: BTreeMap<(i64, String), (i64, Vec<(i64, i64)>)> = BTreeMap::new();
  for (stage_id, drops) in reports.into_values() {
    let pattern = canonicalize(drops);
    let elements = pattern.elements.iter().map(|e| (e.item_id, e.quantity)).collect();
    counts.entry((stage_id, pattern.hash)).or_insert((0, elements)).0 += 1;
  }

  counts
    .into_iter()
    .filter_map(|((stage_id, _), (quantity, elements))| {
      let drops = elements
        .into_iter()
        .map(|(item_id, quantity)| {
          Some(PatternDrop { item_id: catalog.item_ark(item_id)?.to_owned(), quantity })
        })
        .collect::<Option<Vec<_>>>()?;
      Some(PatternEntry {
        stage_id: catalog.stage_ark(stage_id)?.to_owned(),
        times: times.get(&stage_id).copied().unwrap_or_default(),
        quantity,
        pattern: PatternDrops { drops },
        start,
        end,
      })
    })
    .collect()
}

/// Section layout of a trend query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindow {
  pub start:    i64,
  pub interval: i64,
  pub sections: i64,
}

impl TrendWindow {
  /// Round `interval` to whole hours, align `start` to the server's game day
  /// and count the sections up to `end`.
  pub fn new(server: Server, start: i64, end: i64, interval: i64) -> Result<Self, ApiError> {
    if interval < HOUR_MS {
      return Err(ApiError::invalid("interval length must be greater than 1 hour"));
    }
    let out_of_range = || ApiError::invalid("time range out of bounds");
    let interval = interval.checked_add(HOUR_MS / 2).ok_or_else(out_of_range)? / HOUR_MS * HOUR_MS;
    let start = DateTime::<Utc>::from_timestamp_millis(start)
      .map(|t| game_day_start(server, t).timestamp_millis())
      .ok_or_else(|| ApiError::invalid("start out of range"))?;
    let sections = end.checked_sub(start).ok_or_else(out_of_range)? / interval;
    if sections > MAX_SECTIONS {
      return Err(ApiError::invalid("too many sections"));
    }
    let sections = sections.max(1);
    // `end()` must stay representable.
    interval
      .checked_mul(sections)
      .and_then(|span| start.checked_add(span))
      .ok_or_else(out_of_range)?;
    Ok(Self { start, interval, sections })
  }

  pub fn end(&self) -> i64 { self.start + self.interval * self.sections }

  fn section_of(&self, t: i64) -> Option<usize> {
    let offset = t.checked_sub(self.start)?;
    if offset < 0 {
      return None;
    }
    let section = offset / self.interval;
    (section < self.sections).then(|| usize::try_from(section).ok()).flatten()
  }
}

/// Trend over `rows`, bucketed by `window`.
pub fn trend(
  rows: &[ReportRow],
  catalog: &Catalog,
  window: TrendWindow,
  items: Option<&HashSet<i64>>,
) -> TrendResult {
  let sections = usize::try_from(window.sections).unwrap_or_default();
  let mut stage_times: HashMap<i64, Vec<i64>> = HashMap::new();
  let mut quantities: BTreeMap<(i64, i64), Vec<i64>> = BTreeMap::new();
  let mut seen = HashSet::new();

  for row in rows {
    let Some(section) = window.section_of(row.created_at.timestamp_millis()) else {
      continue;
    };
    if seen.insert(row.report_id) {
      stage_times.entry(row.stage_id).or_insert_with(|| vec![0; sections])[section] += row.times;
    }
    if let Some(item_id) = row.item_id
      && items.is_none_or(|set| set.contains(&item_id))
    {
      quantities
        .entry((row.stage_id, item_id))
        .or_insert_with(|| vec![0; sections])[section] += row.quantity;
    }
  }

  let mut result = TrendResult::default();
  for ((stage_id, item_id), quantity) in quantities {
    let (Some(stage), Some(item)) = (catalog.stage_ark(stage_id), catalog.item_ark(item_id)) else {
      continue;
    };
    let times = stage_times.get(&stage_id).cloned().unwrap_or_else(|| vec![0; sections]);
    result
      .trend
      .entry(stage.to_owned())
      .or_insert_with(|| StageTrend { start_time: window.start, results: BTreeMap::new() })
      .results
      .insert(item.to_owned(), ItemTrend { quantity, times });
  }
  result
}
