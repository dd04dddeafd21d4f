//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as millisecond-precision RFC 3339 strings. Enums are
//! stored as their wire labels. Structured fields (existence, bounds, i18n
//! maps, metadata) are stored as compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use penguin_core::{
  model::{
    Activity, Bounds, DropInfo, DropType, Existence, ExtraProcessType, Item, Notice,
    Server, Stage, TimeRange, Zone,
  },
  report::{Account, DropReport, DropReportExtra, RejectRule, ReportMetadata, RuleStatus},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_server(s: Server) -> &'static str {
  match s {
    Server::Cn => "CN",
    Server::Us => "US",
    Server::Jp => "JP",
    Server::Kr => "KR",
  }
}

pub fn decode_server(s: &str) -> Result<Server> { Ok(Server::parse(s)?) }

pub fn decode_drop_type(s: &str) -> Result<DropType> { Ok(DropType::parse(s)?) }

pub fn encode_rule_status(s: RuleStatus) -> &'static str {
  match s {
    RuleStatus::Active => "active",
    RuleStatus::Inactive => "inactive",
  }
}

pub fn decode_rule_status(s: &str) -> Result<RuleStatus> {
  match s {
    "active" => Ok(RuleStatus::Active),
    "inactive" => Ok(RuleStatus::Inactive),
    other => Err(Error::InvalidColumn(format!("rule status {other:?}"))),
  }
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json(s: &str) -> Result<serde_json::Value> { Ok(serde_json::from_str(s)?) }

fn decode_existence(s: &str) -> Result<Existence> { Ok(serde_json::from_str(s)?) }

// ─── Raw rows ────────────────────────────────────────────────────────────────

pub const ZONE_COLUMNS: &str = "zone_id, ark_zone_id, zone_index, category, zone_type, \
                                name, name_i18n, existence, background";

pub struct RawZone {
  pub zone_id:     i64,
  pub ark_zone_id: String,
  pub index:       i64,
  pub category:    String,
  pub zone_type:   Option<String>,
  pub name:        String,
  pub name_i18n:   String,
  pub existence:   String,
  pub background:  Option<String>,
}

impl RawZone {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      zone_id:     row.get(0)?,
      ark_zone_id: row.get(1)?,
      index:       row.get(2)?,
      category:    row.get(3)?,
      zone_type:   row.get(4)?,
      name:        row.get(5)?,
      name_i18n:   row.get(6)?,
      existence:   row.get(7)?,
      background:  row.get(8)?,
    })
  }

  pub fn into_zone(self) -> Result<Zone> {
    Ok(Zone {
      zone_id:     self.zone_id,
      ark_zone_id: self.ark_zone_id,
      index:       self.index,
      category:    self.category,
      zone_type:   self.zone_type,
      name:        self.name,
      name_i18n:   decode_json(&self.name_i18n)?,
      existence:   decode_existence(&self.existence)?,
      background:  self.background,
    })
  }
}

pub const STAGE_COLUMNS: &str = "stage_id, ark_stage_id, zone_id, stage_type, code, code_i18n, \
                                 sanity, existence, min_clear_time, extra_process_type";

pub struct RawStage {
  pub stage_id:           i64,
  pub ark_stage_id:       String,
  pub zone_id:            i64,
  pub stage_type:         String,
  pub code:               String,
  pub code_i18n:          String,
  pub sanity:             Option<i64>,
  pub existence:          String,
  pub min_clear_time:     Option<i64>,
  pub extra_process_type: Option<String>,
}

impl RawStage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      stage_id:           row.get(0)?,
      ark_stage_id:       row.get(1)?,
      zone_id:            row.get(2)?,
      stage_type:         row.get(3)?,
      code:               row.get(4)?,
      code_i18n:          row.get(5)?,
      sanity:             row.get(6)?,
      existence:          row.get(7)?,
      min_clear_time:     row.get(8)?,
      extra_process_type: row.get(9)?,
    })
  }

  pub fn into_stage(self) -> Result<Stage> {
    let extra_process_type = match self.extra_process_type.as_deref() {
      None | Some("") => None,
      Some("GACHABOX") => Some(ExtraProcessType::GachaBox),
      Some(other) => {
        return Err(Error::InvalidColumn(format!("extra process type {other:?}")));
      }
    };
    Ok(Stage {
      stage_id: self.stage_id,
      ark_stage_id: self.ark_stage_id,
      zone_id: self.zone_id,
      stage_type: self.stage_type,
      code: self.code,
      code_i18n: decode_json(&self.code_i18n)?,
      sanity: self.sanity,
      existence: decode_existence(&self.existence)?,
      min_clear_time: self.min_clear_time,
      extra_process_type,
    })
  }
}

pub const ITEM_COLUMNS: &str = "item_id, ark_item_id, name, name_i18n, existence, item_type, \
                                group_id, sort_id, rarity, keywords";

pub struct RawItem {
  pub item_id:     i64,
  pub ark_item_id: String,
  pub name:        String,
  pub name_i18n:   String,
  pub existence:   String,
  pub item_type:   String,
  pub group_id:    Option<String>,
  pub sort_id:     i64,
  pub rarity:      i64,
  pub keywords:    String,
}

impl RawItem {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      item_id:     row.get(0)?,
      ark_item_id: row.get(1)?,
      name:        row.get(2)?,
      name_i18n:   row.get(3)?,
      existence:   row.get(4)?,
      item_type:   row.get(5)?,
      group_id:    row.get(6)?,
      sort_id:     row.get(7)?,
      rarity:      row.get(8)?,
      keywords:    row.get(9)?,
    })
  }

  pub fn into_item(self) -> Result<Item> {
    Ok(Item {
      item_id:     self.item_id,
      ark_item_id: self.ark_item_id,
      name:        self.name,
      name_i18n:   decode_json(&self.name_i18n)?,
      existence:   decode_existence(&self.existence)?,
      item_type:   self.item_type,
      group_id:    self.group_id,
      sort_id:     self.sort_id,
      rarity:      self.rarity,
      keywords:    decode_json(&self.keywords)?,
    })
  }
}

pub const DROP_INFO_COLUMNS: &str =
  "d.drop_id, d.server, d.stage_id, d.item_id, d.drop_type, d.range_id, d.accumulable, d.bounds";

pub struct RawDropInfo {
  pub drop_id:     i64,
  pub server:      String,
  pub stage_id:    i64,
  pub item_id:     Option<i64>,
  pub drop_type:   String,
  pub range_id:    i64,
  pub accumulable: bool,
  pub bounds:      Option<String>,
}

impl RawDropInfo {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      drop_id:     row.get(0)?,
      server:      row.get(1)?,
      stage_id:    row.get(2)?,
      item_id:     row.get(3)?,
      drop_type:   row.get(4)?,
      range_id:    row.get(5)?,
      accumulable: row.get(6)?,
      bounds:      row.get(7)?,
    })
  }

  pub fn into_drop_info(self) -> Result<DropInfo> {
    let bounds: Option<Bounds> = self
      .bounds
      .as_deref()
      .map(serde_json::from_str)
      .transpose()?;
    Ok(DropInfo {
      drop_id: self.drop_id,
      server: decode_server(&self.server)?,
      stage_id: self.stage_id,
      item_id: self.item_id,
      drop_type: decode_drop_type(&self.drop_type)?,
      range_id: self.range_id,
      accumulable: self.accumulable,
      bounds,
    })
  }
}

pub struct RawTimeRange {
  pub range_id:   i64,
  pub server:     String,
  pub name:       Option<String>,
  pub start_time: String,
  pub end_time:   String,
}

impl RawTimeRange {
  pub fn into_time_range(self) -> Result<TimeRange> {
    Ok(TimeRange {
      range_id:   self.range_id,
      server:     decode_server(&self.server)?,
      name:       self.name,
      start_time: decode_dt(&self.start_time)?,
      end_time:   decode_dt(&self.end_time)?,
    })
  }
}

pub struct RawActivity {
  pub activity_id: i64,
  pub name:        String,
  pub name_i18n:   String,
  pub start_time:  String,
  pub end_time:    Option<String>,
  pub existence:   String,
}

impl RawActivity {
  pub fn into_activity(self) -> Result<Activity> {
    Ok(Activity {
      activity_id: self.activity_id,
      name:        self.name,
      name_i18n:   decode_json(&self.name_i18n)?,
      start_time:  decode_dt(&self.start_time)?,
      end_time:    decode_opt_dt(self.end_time)?,
      existence:   decode_existence(&self.existence)?,
    })
  }
}

pub struct RawNotice {
  pub notice_id:    i64,
  pub existence:    String,
  pub priority:     i64,
  pub content_i18n: String,
}

impl RawNotice {
  pub fn into_notice(self) -> Result<Notice> {
    Ok(Notice {
      notice_id:    self.notice_id,
      existence:    decode_existence(&self.existence)?,
      priority:     self.priority,
      content_i18n: decode_json(&self.content_i18n)?,
    })
  }
}

pub struct RawAccount {
  pub account_id: i64,
  pub penguin_id: String,
  pub weight:     f64,
  pub created_at: String,
}

impl RawAccount {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      account_id: row.get(0)?,
      penguin_id: row.get(1)?,
      weight:     row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_account(self) -> Result<Account> {
    Ok(Account {
      account_id: self.account_id,
      penguin_id: self.penguin_id,
      weight:     self.weight,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawRejectRule {
  pub rule_id:          i64,
  pub status:           String,
  pub expr:             String,
  pub with_reliability: i32,
}

impl RawRejectRule {
  pub fn into_rule(self) -> Result<RejectRule> {
    Ok(RejectRule {
      rule_id:          self.rule_id,
      status:           decode_rule_status(&self.status)?,
      expr:             self.expr,
      with_reliability: self.with_reliability,
    })
  }
}

pub struct RawDropReport {
  pub report_id:   i64,
  pub stage_id:    i64,
  pub pattern_id:  i64,
  pub times:       i64,
  pub created_at:  String,
  pub reliability: i32,
  pub server:      String,
  pub account_id:  i64,
  pub source_name: String,
  pub version:     String,
}

impl RawDropReport {
  pub fn into_report(self) -> Result<DropReport> {
    Ok(DropReport {
      report_id:   self.report_id,
      stage_id:    self.stage_id,
      pattern_id:  self.pattern_id,
      times:       self.times,
      created_at:  decode_dt(&self.created_at)?,
      reliability: self.reliability,
      server:      decode_server(&self.server)?,
      account_id:  self.account_id,
      source_name: self.source_name,
      version:     self.version,
    })
  }
}

pub struct RawDropReportExtra {
  pub report_id:   i64,
  pub ip:          String,
  pub source_name: String,
  pub version:     String,
  pub metadata:    String,
  pub md5:         Option<String>,
}

impl RawDropReportExtra {
  pub fn into_extra(self) -> Result<DropReportExtra> {
    let metadata: ReportMetadata = serde_json::from_str(&self.metadata)?;
    Ok(DropReportExtra {
      report_id: self.report_id,
      ip: self.ip,
      source_name: self.source_name,
      version: self.version,
      metadata,
      md5: self.md5,
    })
  }
}
