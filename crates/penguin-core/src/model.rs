//! Catalog entities: servers, zones, stages, items, drop infos and the time
//! ranges they are valid in.
//!
//! Catalog rows are written by external import jobs and read by every other
//! component. Ark ids are the game-provided string identifiers; the numeric
//! ids are internal surrogate keys.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{Error, Result};

// ─── Server ──────────────────────────────────────────────────────────────────

/// A game server region. Every report, drop info and aggregate is scoped to
/// exactly one server.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Server {
  Cn,
  Us,
  Jp,
  Kr,
}

impl Server {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownServer(s.to_owned()))
  }

  /// Fixed UTC offset of the server's business calendar, in hours.
  pub fn utc_offset_hours(self) -> i64 {
    match self {
      Self::Cn => 8,
      Self::Us => -7,
      Self::Jp | Self::Kr => 9,
    }
  }
}

// ─── Drop types ──────────────────────────────────────────────────────────────

/// Internal drop-type bucket.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DropType {
  Regular,
  Special,
  Extra,
  Furniture,
  /// Known to the recognizer but never counted by verification.
  RecognitionOnly,
}

impl DropType {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownDropType(s.to_owned()))
  }
}

/// Drop-type labels accepted on the wire from v2 clients.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalDropType {
  NormalDrop,
  RegularDrop,
  SpecialDrop,
  ExtraDrop,
  Furniture,
}

impl ExternalDropType {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownDropType(s.to_owned()))
  }

  /// Map the external label onto its internal bucket.
  pub fn internal(self) -> DropType {
    match self {
      Self::NormalDrop | Self::RegularDrop => DropType::Regular,
      Self::SpecialDrop => DropType::Special,
      Self::ExtraDrop => DropType::Extra,
      Self::Furniture => DropType::Furniture,
    }
  }
}

// ─── Source category ─────────────────────────────────────────────────────────

/// Partition of aggregates by who produced the underlying reports.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceCategory {
  #[default]
  All,
  Automated,
  Manual,
}

impl SourceCategory {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownSourceCategory(s.to_owned()))
  }
}

// ─── Existence ───────────────────────────────────────────────────────────────

/// Whether an entity exists on one server, and for how long.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerExistence {
  pub exist:      bool,
  /// Epoch milliseconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub open_time:  Option<i64>,
  /// Epoch milliseconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub close_time: Option<i64>,
}

/// Per-server existence, keyed by server.
pub type Existence = BTreeMap<Server, ServerExistence>;

/// `true` if the entity exists on `server`.
pub fn exists_on(existence: &Existence, server: Server) -> bool {
  existence.get(&server).is_some_and(|e| e.exist)
}

/// `true` if the entity exists on `server` and its close time (if any) is
/// still in the future at `now`.
pub fn is_open(existence: &Existence, server: Server, now: DateTime<Utc>) -> bool {
  match existence.get(&server) {
    Some(e) if e.exist => {
      let now_ms = now.timestamp_millis();
      e.open_time.is_none_or(|t| t <= now_ms)
        && e.close_time.is_none_or(|t| now_ms < t)
    }
    _ => false,
  }
}

// ─── Zone / Stage / Item ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
  pub zone_id:     i64,
  pub ark_zone_id: String,
  pub index:       i64,
  pub category:    String,
  pub zone_type:   Option<String>,
  pub name:        String,
  pub name_i18n:   serde_json::Value,
  pub existence:   Existence,
  pub background:  Option<String>,
}

/// Special post-processing applied to reports of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ExtraProcessType {
  /// Every clear opens a box whose contents are reported; `times` is the
  /// total quantity rather than 1.
  GachaBox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
  pub stage_id:           i64,
  pub ark_stage_id:       String,
  pub zone_id:            i64,
  pub stage_type:         String,
  pub code:               String,
  pub code_i18n:          serde_json::Value,
  pub sanity:             Option<i64>,
  pub existence:          Existence,
  pub min_clear_time:     Option<i64>,
  pub extra_process_type: Option<ExtraProcessType>,
}

impl Stage {
  pub fn is_gacha_box(&self) -> bool {
    self.extra_process_type == Some(ExtraProcessType::GachaBox)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
  pub item_id:     i64,
  pub ark_item_id: String,
  pub name:        String,
  pub name_i18n:   serde_json::Value,
  pub existence:   Existence,
  pub item_type:   String,
  pub group_id:    Option<String>,
  pub sort_id:     i64,
  pub rarity:      i64,
  /// Search keyword bag (aliases, pinyin, romaji…).
  pub keywords:    serde_json::Value,
}

// ─── Drop infos ──────────────────────────────────────────────────────────────

/// Inclusive cardinality bounds with a list of forbidden values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
  pub lower:      i64,
  pub upper:      i64,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub exceptions: Vec<i64>,
}

impl Bounds {
  /// `lower <= n <= upper` and `n` is not one of the exceptions.
  pub fn admits(&self, n: i64) -> bool {
    self.lower <= n && n <= self.upper && !self.exceptions.contains(&n)
  }
}

/// Declares which items (or how many items of a type) may drop at a stage
/// during one time range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
  pub drop_id:     i64,
  pub server:      Server,
  pub stage_id:    i64,
  /// `None` bounds the drop type as a whole rather than a single item.
  pub item_id:     Option<i64>,
  pub drop_type:   DropType,
  pub range_id:    i64,
  pub accumulable: bool,
  pub bounds:      Option<Bounds>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
  pub range_id:   i64,
  pub server:     Server,
  pub name:       Option<String>,
  pub start_time: DateTime<Utc>,
  pub end_time:   DateTime<Utc>,
}

impl TimeRange {
  pub fn contains(&self, t: DateTime<Utc>) -> bool {
    self.start_time <= t && t < self.end_time
  }
}

// ─── Misc catalog ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
  pub activity_id: i64,
  pub name:        String,
  pub name_i18n:   serde_json::Value,
  pub start_time:  DateTime<Utc>,
  pub end_time:    Option<DateTime<Utc>>,
  pub existence:   Existence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
  pub notice_id:    i64,
  pub existence:    Existence,
  pub priority:     i64,
  pub content_i18n: serde_json::Value,
}
