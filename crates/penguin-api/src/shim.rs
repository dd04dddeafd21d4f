//! v2-compatible response shapes ("shims") and the catalog lookups used to
//! assemble them from internal rows.
//!
//! Internal numeric ids never leave the service; every shim speaks ark ids.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use penguin_core::{
  aggregate::SiteStats,
  model::{
    Activity, Bounds, DropInfo, DropType, Existence, Item, Notice, Stage, Zone,
  },
  store::CatalogStore,
};
use serde::{Deserialize, Serialize};

/// Ranges ending at or after this instant are open-ended and render `end: null`.
pub const OPEN_END_MS: i64 = 62_141_368_179_000;

pub fn end_ms(t: DateTime<Utc>) -> Option<i64> {
  let ms = t.timestamp_millis();
  (ms < OPEN_END_MS).then_some(ms)
}

/// v2 wire label of an internal drop type.
pub fn shim_drop_type(t: DropType) -> &'static str {
  match t {
    DropType::Regular => "NORMAL_DROP",
    DropType::Special => "SPECIAL_DROP",
    DropType::Extra => "EXTRA_DROP",
    DropType::Furniture => "FURNITURE",
    DropType::RecognitionOnly => "RECOGNITION_ONLY",
  }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// A snapshot of zones, stages and items with ark-id lookups in both
/// directions.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  pub zones:     Vec<Zone>,
  pub stages:    Vec<Stage>,
  pub items:     Vec<Item>,
  stage_by_id:   HashMap<i64, usize>,
  stage_by_ark:  HashMap<String, usize>,
  item_by_id:    HashMap<i64, usize>,
  item_by_ark:   HashMap<String, usize>,
  zone_by_id:    HashMap<i64, usize>,
}

impl Catalog {
  pub fn new(zones: Vec<Zone>, stages: Vec<Stage>, items: Vec<Item>) -> Self {
    let stage_by_id = stages.iter().enumerate().map(|(i, s)| (s.stage_id, i)).collect();
    let stage_by_ark = stages
      .iter()
      .enumerate()
      .map(|(i, s)| (s.ark_stage_id.clone(), i))
      .collect();
    let item_by_id = items.iter().enumerate().map(|(i, it)| (it.item_id, i)).collect();
    let item_by_ark = items
      .iter()
      .enumerate()
      .map(|(i, it)| (it.ark_item_id.clone(), i))
      .collect();
    let zone_by_id = zones.iter().enumerate().map(|(i, z)| (z.zone_id, i)).collect();
    Self { zones, stages, items, stage_by_id, stage_by_ark, item_by_id, item_by_ark, zone_by_id }
  }

  pub async fn load<S: CatalogStore>(store: &S) -> Result<Self, S::Error> {
    Ok(Self::new(store.zones().await?, store.stages().await?, store.items().await?))
  }

  pub fn stage(&self, stage_id: i64) -> Option<&Stage> {
    self.stage_by_id.get(&stage_id).map(|&i| &self.stages[i])
  }

  pub fn stage_by_ark(&self, ark_stage_id: &str) -> Option<&Stage> {
    self.stage_by_ark.get(ark_stage_id).map(|&i| &self.stages[i])
  }

  pub fn item(&self, item_id: i64) -> Option<&Item> {
    self.item_by_id.get(&item_id).map(|&i| &self.items[i])
  }

  pub fn item_by_ark(&self, ark_item_id: &str) -> Option<&Item> {
    self.item_by_ark.get(ark_item_id).map(|&i| &self.items[i])
  }

  pub fn zone(&self, zone_id: i64) -> Option<&Zone> {
    self.zone_by_id.get(&zone_id).map(|&i| &self.zones[i])
  }

  pub fn stage_ark(&self, stage_id: i64) -> Option<&str> {
    self.stage(stage_id).map(|s| s.ark_stage_id.as_str())
  }

  pub fn item_ark(&self, item_id: i64) -> Option<&str> {
    self.item(item_id).map(|i| i.ark_item_id.as_str())
  }
}

// ─── Catalog shims ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemShim {
  pub item_id:   String,
  pub name:      String,
  #[serde(rename = "name_i18n")]
  pub name_i18n: serde_json::Value,
  pub existence: Existence,
  pub item_type: String,
  pub sort_id:   i64,
  pub rarity:    i64,
  #[serde(rename = "groupID", skip_serializing_if = "Option::is_none")]
  pub group_id:  Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub alias:     Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pron:      Option<serde_json::Value>,
}

impl From<&Item> for ItemShim {
  fn from(item: &Item) -> Self {
    Self {
      item_id:   item.ark_item_id.clone(),
      name:      item.name.clone(),
      name_i18n: item.name_i18n.clone(),
      existence: item.existence.clone(),
      item_type: item.item_type.clone(),
      sort_id:   item.sort_id,
      rarity:    item.rarity,
      group_id:  item.group_id.clone(),
      alias:     item.keywords.get("alias").cloned(),
      pron:      item.keywords.get("pron").cloned(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneShim {
  pub zone_id:        String,
  pub zone_index:     i64,
  #[serde(rename = "type")]
  pub category:       String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sub_type:       Option<String>,
  pub zone_name:      String,
  #[serde(rename = "zoneName_i18n")]
  pub zone_name_i18n: serde_json::Value,
  pub existence:      Existence,
  /// Ark ids of the zone's stages.
  pub stages:         Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub background:     Option<String>,
}

impl ZoneShim {
  pub fn new(zone: &Zone, stages: &[Stage]) -> Self {
    Self {
      zone_id:        zone.ark_zone_id.clone(),
      zone_index:     zone.index,
      category:       zone.category.clone(),
      sub_type:       zone.zone_type.clone(),
      zone_name:      zone.name.clone(),
      zone_name_i18n: zone.name_i18n.clone(),
      existence:      zone.existence.clone(),
      stages:         stages
        .iter()
        .filter(|s| s.zone_id == zone.zone_id)
        .map(|s| s.ark_stage_id.clone())
        .collect(),
      background:     zone.background.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropInfoShim {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub item_id:   Option<String>,
  pub drop_type: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bounds:    Option<Bounds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageShim {
  pub stage_type:       String,
  pub stage_id:         String,
  pub zone_id:          String,
  pub code:             String,
  #[serde(rename = "code_i18n")]
  pub code_i18n:        serde_json::Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ap_cost:          Option<i64>,
  pub existence:        Existence,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub min_clear_time:   Option<i64>,
  pub drop_infos:       Vec<DropInfoShim>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub recognition_only: Vec<String>,
  #[serde(default)]
  pub is_gacha_box:     bool,
}

impl StageShim {
  /// `infos` are the stage's drop infos in its current range.
  pub fn new(stage: &Stage, catalog: &Catalog, infos: &[DropInfo]) -> Self {
    let mut drop_infos = Vec::new();
    let mut recognition_only = Vec::new();
    for info in infos.iter().filter(|i| i.stage_id == stage.stage_id) {
      let item_id = info.item_id.and_then(|id| catalog.item_ark(id)).map(str::to_owned);
      if info.drop_type == DropType::RecognitionOnly {
        recognition_only.extend(item_id);
        continue;
      }
      drop_infos.push(DropInfoShim {
        item_id,
        drop_type: shim_drop_type(info.drop_type).to_owned(),
        bounds: info.bounds.clone(),
      });
    }
    Self {
      stage_type: stage.stage_type.clone(),
      stage_id: stage.ark_stage_id.clone(),
      zone_id: catalog
        .zone(stage.zone_id)
        .map(|z| z.ark_zone_id.clone())
        .unwrap_or_default(),
      code: stage.code.clone(),
      code_i18n: stage.code_i18n.clone(),
      ap_cost: stage.sanity,
      existence: stage.existence.clone(),
      min_clear_time: stage.min_clear_time,
      drop_infos,
      recognition_only,
      is_gacha_box: stage.is_gacha_box(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityShim {
  pub start:      i64,
  pub end:        Option<i64>,
  pub label_i18n: serde_json::Value,
  pub existence:  Existence,
}

impl From<&Activity> for ActivityShim {
  fn from(a: &Activity) -> Self {
    Self {
      start:      a.start_time.timestamp_millis(),
      end:        a.end_time.and_then(end_ms),
      label_i18n: a.name_i18n.clone(),
      existence:  a.existence.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeShim {
  pub existence:    Existence,
  pub priority:     i64,
  pub content_i18n: serde_json::Value,
}

impl From<&Notice> for NoticeShim {
  fn from(n: &Notice) -> Self {
    Self {
      existence:    n.existence.clone(),
      priority:     n.priority,
      content_i18n: n.content_i18n.clone(),
    }
  }
}

// ─── Result shims ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixEntry {
  pub stage_id: String,
  pub item_id:  String,
  pub quantity: i64,
  pub times:    i64,
  /// Epoch milliseconds.
  pub start:    i64,
  pub end:      Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropMatrixResult {
  pub matrix: Vec<MatrixEntry>,
}

impl DropMatrixResult {
  /// Keep entries whose stage and item are in the given ark-id lists. An
  /// absent list keeps everything.
  pub fn filtered(&self, stages: Option<&[String]>, items: Option<&[String]>) -> Self {
    let keep = |list: Option<&[String]>, id: &str| list.is_none_or(|l| l.iter().any(|x| x == id));
    Self {
      matrix: self
        .matrix
        .iter()
        .filter(|e| keep(stages, &e.stage_id) && keep(items, &e.item_id))
        .cloned()
        .collect(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDrop {
  pub item_id:  String,
  pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDrops {
  pub drops: Vec<PatternDrop>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternEntry {
  pub stage_id: String,
  pub times:    i64,
  pub quantity: i64,
  pub pattern:  PatternDrops,
  pub start:    i64,
  pub end:      Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatrixResult {
  pub pattern_matrix: Vec<PatternEntry>,
}

impl PatternMatrixResult {
  pub fn filtered(&self, stages: Option<&[String]>) -> Self {
    Self {
      pattern_matrix: self
        .pattern_matrix
        .iter()
        .filter(|e| stages.is_none_or(|l| l.iter().any(|x| *x == e.stage_id)))
        .cloned()
        .collect(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTrend {
  pub quantity: Vec<i64>,
  pub times:    Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTrend {
  pub start_time: i64,
  pub results:    BTreeMap<String, ItemTrend>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendResult {
  /// Keyed by ark stage id.
  pub trend: BTreeMap<String, StageTrend>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTimesShim {
  pub stage_id: String,
  pub times:    i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuantityShim {
  pub item_id:  String,
  pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatsShim {
  pub total_stage_times:     Vec<StageTimesShim>,
  pub total_item_quantities: Vec<ItemQuantityShim>,
  pub total_sanity_cost:     i64,
}

impl SiteStatsShim {
  pub fn new(stats: &SiteStats, catalog: &Catalog) -> Self {
    Self {
      total_stage_times:     stats
        .total_stage_times
        .iter()
        .filter_map(|s| {
          Some(StageTimesShim { stage_id: catalog.stage_ark(s.stage_id)?.to_owned(), times: s.times })
        })
        .collect(),
      total_item_quantities: stats
        .total_item_quantities
        .iter()
        .filter_map(|i| {
          Some(ItemQuantityShim {
            item_id:  catalog.item_ark(i.item_id)?.to_owned(),
            quantity: i.quantity,
          })
        })
        .collect(),
      total_sanity_cost:     stats.total_sanity_cost,
    }
  }
}
