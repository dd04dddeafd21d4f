//! [`QueryStore`] implementation: reads of the aggregate element tables, the
//! raw report scan, and versioned snapshots.

use rusqlite::{OptionalExtension as _, types::Value as SqlValue};

use penguin_core::{
  aggregate::{
    DropMatrixElement, ItemQuantity, PatternMatrixElement, ReportRow, SiteStats, StageTimes,
    TrendElement,
  },
  model::{DropType, Server, SourceCategory},
  pattern::PatternElement,
  report::reliability,
  store::{QueryStore, ReportRowQuery},
};

use crate::{
  encode::{decode_dt, decode_json, encode_dt, encode_server},
  store::{SqliteStore, collect},
  Result,
};

// ─── Raw rows ────────────────────────────────────────────────────────────────

struct RawDropMatrixElement {
  stage_id:         i64,
  item_id:          i64,
  range_id:         i64,
  start_time:       String,
  end_time:         String,
  quantity:         i64,
  times:            i64,
  quantity_buckets: String,
}

impl RawDropMatrixElement {
  fn into_element(self) -> Result<DropMatrixElement> {
    Ok(DropMatrixElement {
      stage_id:         self.stage_id,
      item_id:          self.item_id,
      range_id:         self.range_id,
      start_time:       decode_dt(&self.start_time)?,
      end_time:         decode_dt(&self.end_time)?,
      quantity:         self.quantity,
      times:            self.times,
      quantity_buckets: decode_json(&self.quantity_buckets)?,
    })
  }
}

struct RawPatternMatrixElement {
  stage_id:   i64,
  pattern_id: i64,
  range_id:   i64,
  start_time: String,
  end_time:   String,
  quantity:   i64,
  times:      i64,
}

struct RawTrendElement {
  stage_id:   i64,
  item_id:    i64,
  group_id:   i64,
  start_time: String,
  end_time:   String,
  quantity:   i64,
  times:      i64,
}

struct RawReportRow {
  report_id:  i64,
  stage_id:   i64,
  times:      i64,
  created_at: String,
  item_id:    Option<i64>,
  quantity:   i64,
}

// ─── SQL helpers ─────────────────────────────────────────────────────────────

/// Append a `source_name` predicate for `category` to `sql`, pushing the
/// bound values onto `params`.
fn push_source_filter(
  sql: &mut String,
  params: &mut Vec<SqlValue>,
  category: SourceCategory,
  automated: &[String],
) {
  let negate = match category {
    SourceCategory::All => return,
    SourceCategory::Automated => "",
    SourceCategory::Manual => "NOT ",
  };
  if automated.is_empty() {
    // Nothing is automated: `automated` matches no rows, `manual` matches all.
    if negate.is_empty() {
      sql.push_str(" AND 0");
    }
    return;
  }
  let placeholders = vec!["?"; automated.len()].join(", ");
  sql.push_str(&format!(" AND r.source_name {negate}IN ({placeholders})"));
  params.extend(automated.iter().cloned().map(SqlValue::Text));
}

// ─── QueryStore impl ─────────────────────────────────────────────────────────

impl QueryStore for SqliteStore {
  async fn drop_matrix_elements(
    &self,
    server: Server,
    source_category: SourceCategory,
  ) -> Result<Vec<DropMatrixElement>> {
    let server_str = encode_server(server);
    let category = source_category.to_string();
    let raws = self
      .conn
      .call(move |conn| {
        Ok(collect(
          conn,
          "SELECT m.stage_id, m.item_id, m.range_id, r.start_time, r.end_time,
                  m.quantity, m.times, m.quantity_buckets
           FROM drop_matrix_elements m
           JOIN time_ranges r ON r.range_id = m.range_id
           WHERE m.server = ?1 AND m.source_category = ?2
           ORDER BY m.stage_id, m.item_id, r.start_time",
          rusqlite::params![server_str, category],
          |row| {
            Ok(RawDropMatrixElement {
              stage_id:         row.get(0)?,
              item_id:          row.get(1)?,
              range_id:         row.get(2)?,
              start_time:       row.get(3)?,
              end_time:         row.get(4)?,
              quantity:         row.get(5)?,
              times:            row.get(6)?,
              quantity_buckets: row.get(7)?,
            })
          },
        )?)
      })
      .await?;
    raws.into_iter().map(RawDropMatrixElement::into_element).collect()
  }

  async fn latest_pattern_matrix_elements(
    &self,
    server: Server,
    source_category: SourceCategory,
  ) -> Result<Vec<PatternMatrixElement>> {
    let server_str = encode_server(server);
    let category = source_category.to_string();
    let rows = self
      .conn
      .call(move |conn| {
        let raws = collect(
          conn,
          "SELECT p.stage_id, p.pattern_id, p.range_id, r.start_time, r.end_time,
                  p.quantity, p.times
           FROM pattern_matrix_elements p
           JOIN time_ranges r ON r.range_id = p.range_id
           WHERE p.server = ?1 AND p.source_category = ?2
             AND r.start_time = (
               SELECT MAX(r2.start_time)
               FROM pattern_matrix_elements p2
               JOIN time_ranges r2 ON r2.range_id = p2.range_id
               WHERE p2.server = p.server
                 AND p2.source_category = p.source_category
                 AND p2.stage_id = p.stage_id
             )
           ORDER BY p.stage_id, p.pattern_id",
          rusqlite::params![server_str, category],
          |row| {
            Ok(RawPatternMatrixElement {
              stage_id:   row.get(0)?,
              pattern_id: row.get(1)?,
              range_id:   row.get(2)?,
              start_time: row.get(3)?,
              end_time:   row.get(4)?,
              quantity:   row.get(5)?,
              times:      row.get(6)?,
            })
          },
        )?;

        let mut stmt = conn.prepare(
          "SELECT item_id, quantity FROM drop_pattern_elements
           WHERE pattern_id = ?1 ORDER BY item_id",
        )?;
        let mut out = Vec::with_capacity(raws.len());
        for raw in raws {
          let drops = stmt
            .query_map(rusqlite::params![raw.pattern_id], |row| {
              Ok(PatternElement { item_id: row.get(0)?, quantity: row.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.push((raw, drops));
        }
        Ok(out)
      })
      .await?;

    rows
      .into_iter()
      .map(|(raw, drops)| {
        Ok(PatternMatrixElement {
          stage_id: raw.stage_id,
          pattern_id: raw.pattern_id,
          range_id: raw.range_id,
          start_time: decode_dt(&raw.start_time)?,
          end_time: decode_dt(&raw.end_time)?,
          quantity: raw.quantity,
          times: raw.times,
          drops,
        })
      })
      .collect()
  }

  async fn trend_elements(&self, server: Server) -> Result<Vec<TrendElement>> {
    let server_str = encode_server(server);
    let raws = self
      .conn
      .call(move |conn| {
        Ok(collect(
          conn,
          "SELECT stage_id, item_id, group_id, start_time, end_time, quantity, times
           FROM trend_elements
           WHERE server = ?1 AND source_category = 'all'
           ORDER BY stage_id, item_id, group_id",
          rusqlite::params![server_str],
          |row| {
            Ok(RawTrendElement {
              stage_id:   row.get(0)?,
              item_id:    row.get(1)?,
              group_id:   row.get(2)?,
              start_time: row.get(3)?,
              end_time:   row.get(4)?,
              quantity:   row.get(5)?,
              times:      row.get(6)?,
            })
          },
        )?)
      })
      .await?;
    raws
      .into_iter()
      .map(|raw| {
        Ok(TrendElement {
          stage_id: raw.stage_id,
          item_id: raw.item_id,
          group_id: raw.group_id,
          start_time: decode_dt(&raw.start_time)?,
          end_time: decode_dt(&raw.end_time)?,
          quantity: raw.quantity,
          times: raw.times,
        })
      })
      .collect()
  }

  async fn site_stats(&self, server: Server) -> Result<SiteStats> {
    let server_str = encode_server(server);
    let stats = self
      .conn
      .call(move |conn| {
        // Every item row of a (stage, range) repeats the stage's clear count,
        // so take one per range before summing.
        let total_stage_times = collect(
          conn,
          "SELECT stage_id, SUM(t) AS total FROM (
             SELECT stage_id, range_id, MAX(times) AS t
             FROM drop_matrix_elements
             WHERE server = ?1 AND source_category = 'all'
             GROUP BY stage_id, range_id
           )
           GROUP BY stage_id
           ORDER BY total DESC, stage_id",
          rusqlite::params![server_str],
          |row| Ok(StageTimes { stage_id: row.get(0)?, times: row.get(1)? }),
        )?;

        let total_item_quantities = collect(
          conn,
          "SELECT item_id, SUM(quantity) AS total
           FROM drop_matrix_elements
           WHERE server = ?1 AND source_category = 'all'
           GROUP BY item_id
           ORDER BY total DESC, item_id",
          rusqlite::params![server_str],
          |row| Ok(ItemQuantity { item_id: row.get(0)?, quantity: row.get(1)? }),
        )?;

        let total_sanity_cost: i64 = conn.query_row(
          "SELECT COALESCE(SUM(t.total * COALESCE(s.sanity, 0)), 0) FROM (
             SELECT stage_id, SUM(t) AS total FROM (
               SELECT stage_id, range_id, MAX(times) AS t
               FROM drop_matrix_elements
               WHERE server = ?1 AND source_category = 'all'
               GROUP BY stage_id, range_id
             )
             GROUP BY stage_id
           ) t
           JOIN stages s ON s.stage_id = t.stage_id",
          rusqlite::params![server_str],
          |r| r.get(0),
        )?;

        Ok(SiteStats { total_sanity_cost, total_stage_times, total_item_quantities })
      })
      .await?;
    Ok(stats)
  }

  async fn item_drop_set(&self, server: Server, stage_id: i64, range_id: i64) -> Result<Vec<i64>> {
    let server_str = encode_server(server);
    let recognition_only = DropType::RecognitionOnly.to_string();
    let ids: Vec<i64> = self
      .conn
      .call(move |conn| {
        Ok(collect(
          conn,
          "SELECT DISTINCT item_id FROM drop_infos
           WHERE server = ?1 AND stage_id = ?2 AND range_id = ?3
             AND item_id IS NOT NULL AND drop_type != ?4
           ORDER BY item_id",
          rusqlite::params![server_str, stage_id, range_id, recognition_only],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(ids)
  }

  async fn report_rows(&self, query: &ReportRowQuery) -> Result<Vec<ReportRow>> {
    let mut sql = String::from(
      "SELECT r.report_id, r.stage_id, r.times, r.created_at, e.item_id,
              COALESCE(e.quantity, 0)
       FROM drop_reports r
       LEFT JOIN drop_pattern_elements e ON e.pattern_id = r.pattern_id
       WHERE r.server = ? AND r.reliability = ?
         AND r.created_at >= ? AND r.created_at < ?",
    );
    let mut params = vec![
      SqlValue::Text(encode_server(query.server).to_owned()),
      SqlValue::Integer(i64::from(reliability::OK)),
      SqlValue::Text(encode_dt(query.start)),
      SqlValue::Text(encode_dt(query.end)),
    ];

    if !query.stage_ids.is_empty() {
      let placeholders = vec!["?"; query.stage_ids.len()].join(", ");
      sql.push_str(&format!(" AND r.stage_id IN ({placeholders})"));
      params.extend(query.stage_ids.iter().map(|&id| SqlValue::Integer(id)));
    }
    if let Some(account_id) = query.account_id {
      sql.push_str(" AND r.account_id = ?");
      params.push(SqlValue::Integer(account_id));
    }
    push_source_filter(&mut sql, &mut params, query.source_category, &query.automated);
    sql.push_str(" ORDER BY r.report_id, e.item_id");

    let raws = self
      .conn
      .call(move |conn| {
        Ok(collect(conn, &sql, rusqlite::params_from_iter(params), |row| {
          Ok(RawReportRow {
            report_id:  row.get(0)?,
            stage_id:   row.get(1)?,
            times:      row.get(2)?,
            created_at: row.get(3)?,
            item_id:    row.get(4)?,
            quantity:   row.get(5)?,
          })
        })?)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        Ok(ReportRow {
          report_id: raw.report_id,
          stage_id: raw.stage_id,
          times: raw.times,
          created_at: decode_dt(&raw.created_at)?,
          item_id: raw.item_id,
          quantity: raw.quantity,
        })
      })
      .collect()
  }

  async fn latest_snapshot_version(&self, server: Server, realm: &str) -> Result<Option<i64>> {
    let server_str = encode_server(server);
    let realm = realm.to_owned();
    let version = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT MAX(version) FROM snapshots WHERE server = ?1 AND realm = ?2",
          rusqlite::params![server_str, realm],
          |r| r.get::<_, Option<i64>>(0),
        )?)
      })
      .await?;
    Ok(version)
  }

  async fn snapshot(
    &self,
    server: Server,
    realm: &str,
    version: i64,
  ) -> Result<Option<serde_json::Value>> {
    let server_str = encode_server(server);
    let realm = realm.to_owned();
    let content: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT content FROM snapshots
               WHERE server = ?1 AND realm = ?2 AND version = ?3",
              rusqlite::params![server_str, realm, version],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    content.as_deref().map(decode_json).transpose()
  }
}
