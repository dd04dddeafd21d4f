//! Write helpers for the tables this service only reads.
//!
//! Catalog rows, reject rules, aggregate elements and snapshots are produced
//! by import and aggregation jobs outside the request path. These helpers are
//! what those jobs (and the tests) call. Catalog inserts are upserts keyed on
//! the row's own id.

use chrono::Utc;

use penguin_core::{
  aggregate::{DropMatrixElement, PatternMatrixElement, TrendElement},
  model::{Activity, DropInfo, Item, Notice, Server, SourceCategory, Stage, TimeRange, Zone},
  report::RejectRule,
};

use crate::{
  encode::{encode_dt, encode_json, encode_rule_status, encode_server},
  store::SqliteStore,
  Result,
};

impl SqliteStore {
  pub async fn insert_zone(&self, zone: &Zone) -> Result<()> {
    let zone = zone.clone();
    let name_i18n = encode_json(&zone.name_i18n)?;
    let existence = encode_json(&zone.existence)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO zones (
             zone_id, ark_zone_id, zone_index, category, zone_type,
             name, name_i18n, existence, background
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            zone.zone_id,
            zone.ark_zone_id,
            zone.index,
            zone.category,
            zone.zone_type,
            zone.name,
            name_i18n,
            existence,
            zone.background,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_stage(&self, stage: &Stage) -> Result<()> {
    let stage = stage.clone();
    let code_i18n = encode_json(&stage.code_i18n)?;
    let existence = encode_json(&stage.existence)?;
    let extra = stage.extra_process_type.map(|t| t.to_string());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO stages (
             stage_id, ark_stage_id, zone_id, stage_type, code, code_i18n,
             sanity, existence, min_clear_time, extra_process_type
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            stage.stage_id,
            stage.ark_stage_id,
            stage.zone_id,
            stage.stage_type,
            stage.code,
            code_i18n,
            stage.sanity,
            existence,
            stage.min_clear_time,
            extra,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_item(&self, item: &Item) -> Result<()> {
    let item = item.clone();
    let name_i18n = encode_json(&item.name_i18n)?;
    let existence = encode_json(&item.existence)?;
    let keywords = encode_json(&item.keywords)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO items (
             item_id, ark_item_id, name, name_i18n, existence,
             item_type, group_id, sort_id, rarity, keywords
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            item.item_id,
            item.ark_item_id,
            item.name,
            name_i18n,
            existence,
            item.item_type,
            item.group_id,
            item.sort_id,
            item.rarity,
            keywords,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_time_range(&self, range: &TimeRange) -> Result<()> {
    let range_id = range.range_id;
    let server = encode_server(range.server);
    let name = range.name.clone();
    let start = encode_dt(range.start_time);
    let end = encode_dt(range.end_time);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO time_ranges (range_id, server, name, start_time, end_time)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![range_id, server, name, start, end],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_drop_info(&self, info: &DropInfo) -> Result<()> {
    let info = info.clone();
    let server = encode_server(info.server);
    let drop_type = info.drop_type.to_string();
    let bounds = info.bounds.as_ref().map(encode_json).transpose()?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO drop_infos (
             drop_id, server, stage_id, item_id, drop_type, range_id, accumulable, bounds
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            info.drop_id,
            server,
            info.stage_id,
            info.item_id,
            drop_type,
            info.range_id,
            info.accumulable,
            bounds,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_activity(&self, activity: &Activity) -> Result<()> {
    let activity_id = activity.activity_id;
    let name = activity.name.clone();
    let name_i18n = encode_json(&activity.name_i18n)?;
    let start = encode_dt(activity.start_time);
    let end = activity.end_time.map(encode_dt);
    let existence = encode_json(&activity.existence)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO activities (
             activity_id, name, name_i18n, start_time, end_time, existence
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![activity_id, name, name_i18n, start, end, existence],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_notice(&self, notice: &Notice) -> Result<()> {
    let notice_id = notice.notice_id;
    let priority = notice.priority;
    let existence = encode_json(&notice.existence)?;
    let content = encode_json(&notice.content_i18n)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO notices (notice_id, existence, priority, content_i18n)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![notice_id, existence, priority, content],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn set_property(&self, key: &str, value: &serde_json::Value) -> Result<()> {
    let key = key.to_owned();
    let value = encode_json(value)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO properties (key, value) VALUES (?1, ?2)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value",
          rusqlite::params![key, value],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert a reject rule, returning its id.
  pub async fn insert_reject_rule(&self, rule: &RejectRule) -> Result<i64> {
    let status = encode_rule_status(rule.status);
    let expr = rule.expr.clone();
    let with_reliability = rule.with_reliability;
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO reject_rules (status, expr, with_reliability) VALUES (?1, ?2, ?3)",
          rusqlite::params![status, expr, with_reliability],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;
    Ok(id)
  }

  // ── Aggregate elements ──

  /// `start_time`/`end_time` of the element are taken from its range when
  /// read back and are not stored.
  pub async fn insert_drop_matrix_element(
    &self,
    server: Server,
    source_category: SourceCategory,
    element: &DropMatrixElement,
  ) -> Result<()> {
    let server = encode_server(server);
    let category = source_category.to_string();
    let e = element.clone();
    let buckets = encode_json(&e.quantity_buckets)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO drop_matrix_elements (
             server, stage_id, item_id, range_id, quantity, times, quantity_buckets, source_category
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            server, e.stage_id, e.item_id, e.range_id, e.quantity, e.times, buckets, category,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// The element's `drops` come from the pattern table and are not stored.
  pub async fn insert_pattern_matrix_element(
    &self,
    server: Server,
    source_category: SourceCategory,
    element: &PatternMatrixElement,
  ) -> Result<()> {
    let server = encode_server(server);
    let category = source_category.to_string();
    let (stage_id, pattern_id, range_id, quantity, times) = (
      element.stage_id,
      element.pattern_id,
      element.range_id,
      element.quantity,
      element.times,
    );
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO pattern_matrix_elements (
             server, stage_id, pattern_id, range_id, quantity, times, source_category
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![server, stage_id, pattern_id, range_id, quantity, times, category],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_trend_element(&self, server: Server, element: &TrendElement) -> Result<()> {
    let server = encode_server(server);
    let e = element.clone();
    let start = encode_dt(e.start_time);
    let end = encode_dt(e.end_time);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO trend_elements (
             server, stage_id, item_id, group_id, start_time, end_time, quantity, times
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            server, e.stage_id, e.item_id, e.group_id, start, end, e.quantity, e.times,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_snapshot(
    &self,
    server: Server,
    realm: &str,
    version: i64,
    content: &serde_json::Value,
  ) -> Result<()> {
    let server = encode_server(server);
    let realm = realm.to_owned();
    let content = encode_json(content)?;
    let created_at = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO snapshots (server, realm, version, content, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![server, realm, version, content, created_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
