//! [`SqliteStore`]: the SQLite implementation of [`CatalogStore`] and
//! [`ReportStore`].

use std::{collections::HashMap, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use penguin_core::{
  model::{Activity, DropInfo, Item, Notice, Server, Stage, TimeRange, Zone},
  pattern::{CanonicalPattern, DropPattern, PatternElement, canonicalize},
  report::{
    Account, DropReport, DropReportExtra, RejectRule, ReportTask, RuleStatus, reliability,
  },
  store::{CatalogStore, ReportStore},
};

use crate::{
  encode::{
    DROP_INFO_COLUMNS, ITEM_COLUMNS, RawAccount, RawActivity, RawDropInfo, RawDropReport,
    RawDropReportExtra, RawItem, RawNotice, RawRejectRule, RawStage, RawTimeRange, RawZone,
    STAGE_COLUMNS, ZONE_COLUMNS, decode_json, encode_dt, encode_json, encode_rule_status,
    encode_server,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Penguin store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every call
/// is serialised onto the connection's thread, so a multi-statement closure
/// observes no interleaved writes.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "opening sqlite store");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// The underlying connection, shared with [`crate::SqliteKv`].
  pub fn connection(&self) -> tokio_rusqlite::Connection { self.conn.clone() }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Run `sql` and collect every row through `f`.
pub(crate) fn collect<T, P>(
  conn: &rusqlite::Connection,
  sql: &str,
  params: P,
  f: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>>
where
  P: rusqlite::Params,
{
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt.query_map(params, f)?.collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Look a pattern up by hash inside an open transaction, inserting the
/// pattern and one element row per distinct item on a miss.
fn get_or_create_pattern(
  conn: &rusqlite::Connection,
  pattern: &CanonicalPattern,
) -> rusqlite::Result<(i64, bool)> {
  let existing: Option<i64> = conn
    .query_row(
      "SELECT pattern_id FROM drop_patterns WHERE hash = ?1",
      rusqlite::params![pattern.hash],
      |r| r.get(0),
    )
    .optional()?;
  if let Some(id) = existing {
    return Ok((id, false));
  }

  conn.execute(
    "INSERT INTO drop_patterns (hash, original_fingerprint) VALUES (?1, ?2)",
    rusqlite::params![pattern.hash, pattern.fingerprint],
  )?;
  let pattern_id = conn.last_insert_rowid();
  for element in &pattern.elements {
    conn.execute(
      "INSERT INTO drop_pattern_elements (pattern_id, item_id, quantity) VALUES (?1, ?2, ?3)",
      rusqlite::params![pattern_id, element.item_id, element.quantity],
    )?;
  }
  Ok((pattern_id, true))
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  type Error = Error;

  async fn zones(&self) -> Result<Vec<Zone>> {
    let raws = self
      .conn
      .call(|conn| {
        Ok(collect(
          conn,
          &format!("SELECT {ZONE_COLUMNS} FROM zones ORDER BY zone_index, zone_id"),
          [],
          RawZone::from_row,
        )?)
      })
      .await?;
    raws.into_iter().map(RawZone::into_zone).collect()
  }

  async fn stages(&self) -> Result<Vec<Stage>> {
    let raws = self
      .conn
      .call(|conn| {
        Ok(collect(
          conn,
          &format!("SELECT {STAGE_COLUMNS} FROM stages ORDER BY stage_id"),
          [],
          RawStage::from_row,
        )?)
      })
      .await?;
    raws.into_iter().map(RawStage::into_stage).collect()
  }

  async fn items(&self) -> Result<Vec<Item>> {
    let raws = self
      .conn
      .call(|conn| {
        Ok(collect(
          conn,
          &format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY sort_id, item_id"),
          [],
          RawItem::from_row,
        )?)
      })
      .await?;
    raws.into_iter().map(RawItem::into_item).collect()
  }

  async fn stage_by_ark_id(&self, ark_stage_id: &str) -> Result<Option<Stage>> {
    let ark = ark_stage_id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {STAGE_COLUMNS} FROM stages WHERE ark_stage_id = ?1"),
              rusqlite::params![ark],
              RawStage::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawStage::into_stage).transpose()
  }

  async fn item_ids_by_ark_ids(&self, ark_item_ids: &[String]) -> Result<HashMap<String, i64>> {
    let wanted = ark_item_ids.to_vec();
    let map = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare("SELECT item_id FROM items WHERE ark_item_id = ?1")?;
        let mut map = HashMap::new();
        for ark in wanted {
          let id: Option<i64> = stmt
            .query_row(rusqlite::params![ark], |r| r.get(0))
            .optional()?;
          if let Some(id) = id {
            map.insert(ark, id);
          }
        }
        Ok(map)
      })
      .await?;
    Ok(map)
  }

  async fn time_ranges(&self, server: Server) -> Result<Vec<TimeRange>> {
    let server_str = encode_server(server);
    let raws = self
      .conn
      .call(move |conn| {
        Ok(collect(
          conn,
          "SELECT range_id, server, name, start_time, end_time
           FROM time_ranges WHERE server = ?1 ORDER BY start_time",
          rusqlite::params![server_str],
          |row| {
            Ok(RawTimeRange {
              range_id:   row.get(0)?,
              server:     row.get(1)?,
              name:       row.get(2)?,
              start_time: row.get(3)?,
              end_time:   row.get(4)?,
            })
          },
        )?)
      })
      .await?;
    raws.into_iter().map(RawTimeRange::into_time_range).collect()
  }

  async fn drop_infos(&self, server: Server) -> Result<Vec<DropInfo>> {
    let server_str = encode_server(server);
    let raws = self
      .conn
      .call(move |conn| {
        Ok(collect(
          conn,
          &format!(
            "SELECT {DROP_INFO_COLUMNS} FROM drop_infos d WHERE d.server = ?1 ORDER BY d.drop_id"
          ),
          rusqlite::params![server_str],
          RawDropInfo::from_row,
        )?)
      })
      .await?;
    raws.into_iter().map(RawDropInfo::into_drop_info).collect()
  }

  async fn activities(&self) -> Result<Vec<Activity>> {
    let raws = self
      .conn
      .call(|conn| {
        Ok(collect(
          conn,
          "SELECT activity_id, name, name_i18n, start_time, end_time, existence
           FROM activities ORDER BY start_time",
          [],
          |row| {
            Ok(RawActivity {
              activity_id: row.get(0)?,
              name:        row.get(1)?,
              name_i18n:   row.get(2)?,
              start_time:  row.get(3)?,
              end_time:    row.get(4)?,
              existence:   row.get(5)?,
            })
          },
        )?)
      })
      .await?;
    raws.into_iter().map(RawActivity::into_activity).collect()
  }

  async fn notices(&self) -> Result<Vec<Notice>> {
    let raws = self
      .conn
      .call(|conn| {
        Ok(collect(
          conn,
          "SELECT notice_id, existence, priority, content_i18n
           FROM notices ORDER BY priority DESC, notice_id",
          [],
          |row| {
            Ok(RawNotice {
              notice_id:    row.get(0)?,
              existence:    row.get(1)?,
              priority:     row.get(2)?,
              content_i18n: row.get(3)?,
            })
          },
        )?)
      })
      .await?;
    raws.into_iter().map(RawNotice::into_notice).collect()
  }

  async fn property(&self, key: &str) -> Result<Option<serde_json::Value>> {
    let key = key.to_owned();
    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM properties WHERE key = ?1",
              rusqlite::params![key],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    raw.as_deref().map(decode_json).transpose()
  }

  async fn account_by_penguin_id(&self, penguin_id: &str) -> Result<Option<Account>> {
    let penguin_id = penguin_id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT account_id, penguin_id, weight, created_at
               FROM accounts WHERE penguin_id = ?1",
              rusqlite::params![penguin_id],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAccount::into_account).transpose()
  }
}

// ─── ReportStore impl ────────────────────────────────────────────────────────

impl ReportStore for SqliteStore {
  async fn account_exists(&self, account_id: i64) -> Result<bool> {
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM accounts WHERE account_id = ?1",
              rusqlite::params![account_id],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn create_account(&self, penguin_id: &str) -> Result<Option<Account>> {
    let created_at = Utc::now();
    let penguin_id = penguin_id.to_owned();
    let at_str = encode_dt(created_at);
    let id_for_insert = penguin_id.clone();

    let account_id: Option<i64> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "INSERT INTO accounts (penguin_id, weight, created_at) VALUES (?1, 1.0, ?2)
           ON CONFLICT(penguin_id) DO NOTHING",
          rusqlite::params![id_for_insert, at_str],
        )?;
        Ok((changed > 0).then(|| conn.last_insert_rowid()))
      })
      .await?;

    Ok(account_id.map(|account_id| Account {
      account_id,
      penguin_id,
      weight: 1.0,
      created_at,
    }))
  }

  async fn md5_exists(&self, md5: &str) -> Result<bool> {
    let md5 = md5.to_owned();
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM drop_report_extras WHERE md5 = ?1",
              rusqlite::params![md5],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn active_drop_infos(
    &self,
    server:   Server,
    stage_id: i64,
    at:       DateTime<Utc>,
  ) -> Result<Vec<DropInfo>> {
    let server_str = encode_server(server);
    let at_str = encode_dt(at);
    let raws = self
      .conn
      .call(move |conn| {
        Ok(collect(
          conn,
          &format!(
            "SELECT {DROP_INFO_COLUMNS}
             FROM drop_infos d
             JOIN time_ranges r ON r.range_id = d.range_id
             WHERE d.server = ?1 AND d.stage_id = ?2
               AND r.start_time <= ?3 AND ?3 < r.end_time
             ORDER BY d.drop_id"
          ),
          rusqlite::params![server_str, stage_id, at_str],
          RawDropInfo::from_row,
        )?)
      })
      .await?;
    raws.into_iter().map(RawDropInfo::into_drop_info).collect()
  }

  async fn active_reject_rules(&self) -> Result<Vec<RejectRule>> {
    let active = encode_rule_status(RuleStatus::Active);
    let raws = self
      .conn
      .call(move |conn| {
        Ok(collect(
          conn,
          "SELECT rule_id, status, expr, with_reliability
           FROM reject_rules WHERE status = ?1 ORDER BY rule_id",
          rusqlite::params![active],
          |row| {
            Ok(RawRejectRule {
              rule_id:          row.get(0)?,
              status:           row.get(1)?,
              expr:             row.get(2)?,
              with_reliability: row.get(3)?,
            })
          },
        )?)
      })
      .await?;
    raws.into_iter().map(RawRejectRule::into_rule).collect()
  }

  async fn get_or_create_drop_pattern(
    &self,
    pattern: CanonicalPattern,
  ) -> Result<(DropPattern, bool)> {
    let hash = pattern.hash.clone();
    let fingerprint = pattern.fingerprint.clone();
    let (pattern_id, created) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let result = get_or_create_pattern(&tx, &pattern)?;
        tx.commit()?;
        Ok(result)
      })
      .await?;
    Ok((
      DropPattern { pattern_id, hash, original_fingerprint: fingerprint },
      created,
    ))
  }

  async fn pattern_elements(&self, pattern_id: i64) -> Result<Vec<PatternElement>> {
    let elements = self
      .conn
      .call(move |conn| {
        Ok(collect(
          conn,
          "SELECT item_id, quantity FROM drop_pattern_elements
           WHERE pattern_id = ?1 ORDER BY item_id",
          rusqlite::params![pattern_id],
          |row| Ok(PatternElement { item_id: row.get(0)?, quantity: row.get(1)? }),
        )?)
      })
      .await?;
    Ok(elements)
  }

  async fn persist_task(&self, task: &ReportTask, reliabilities: &[i32]) -> Result<Vec<i64>> {
    if task.reports.len() != reliabilities.len() {
      return Err(Error::ReliabilityMismatch {
        reports:       task.reports.len(),
        reliabilities: reliabilities.len(),
      });
    }

    struct Row {
      ark_stage_id: String,
      pattern:      CanonicalPattern,
      times:        i64,
      reliability:  i32,
      metadata:     String,
      md5:          Option<String>,
    }

    let mut rows = Vec::with_capacity(task.reports.len());
    for (report, &rel) in task.reports.iter().zip(reliabilities) {
      // A report rejected as an md5 duplicate must not claim the md5.
      let md5 = match rel {
        reliability::MD5 => None,
        _ => report.metadata.md5().map(str::to_owned),
      };
      rows.push(Row {
        ark_stage_id: report.ark_stage_id.clone(),
        pattern:      canonicalize(report.drops.iter().map(|d| (d.item_id, d.quantity))),
        times:        report.times,
        reliability:  rel,
        metadata:     encode_json(&report.metadata)?,
        md5,
      });
    }

    let created_at  = encode_dt(task.created_at_utc());
    let server      = encode_server(task.server);
    let account_id  = task.account_id;
    let source_name = task.source.clone();
    let version     = task.version.clone();
    let ip          = task.ip.clone();
    let task_id     = task.task_id.clone();

    let (ids, replayed) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // A redelivered task whose first attempt committed keeps its reports.
        let existing = tx
          .prepare("SELECT report_id FROM drop_reports WHERE task_id = ?1 ORDER BY task_index")?
          .query_map(rusqlite::params![task_id], |r| r.get::<_, i64>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        if !existing.is_empty() {
          return Ok((existing, true));
        }

        let mut ids = Vec::with_capacity(rows.len());
        for (task_index, row) in rows.into_iter().enumerate() {
          let stage_id: Option<i64> = tx
            .query_row(
              "SELECT stage_id FROM stages WHERE ark_stage_id = ?1",
              rusqlite::params![row.ark_stage_id],
              |r| r.get(0),
            )
            .optional()?;
          let stage_id = stage_id.ok_or_else(|| {
            tokio_rusqlite::Error::Other(Box::new(Error::StageNotFound(row.ark_stage_id.clone())))
          })?;

          let (pattern_id, _created) = get_or_create_pattern(&tx, &row.pattern)?;

          tx.execute(
            "INSERT INTO drop_reports (
               stage_id, pattern_id, times, created_at, reliability,
               server, account_id, source_name, version, task_id, task_index
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
              stage_id,
              pattern_id,
              row.times,
              created_at,
              row.reliability,
              server,
              account_id,
              source_name,
              version,
              task_id,
              task_index as i64,
            ],
          )?;
          let report_id = tx.last_insert_rowid();

          tx.execute(
            "INSERT INTO drop_report_extras (report_id, ip, source_name, version, metadata, md5)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![report_id, ip, source_name, version, row.metadata, row.md5],
          )?;
          ids.push(report_id);
        }
        tx.commit()?;
        Ok((ids, false))
      })
      .await?;
    if replayed {
      tracing::info!(task_id = %task.task_id, reports = ids.len(), "task already persisted");
    } else {
      tracing::debug!(task_id = %task.task_id, reports = ids.len(), "persisted task");
    }
    Ok(ids)
  }

  async fn drop_report(&self, report_id: i64) -> Result<Option<DropReport>> {
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT report_id, stage_id, pattern_id, times, created_at, reliability,
                      server, account_id, source_name, version
               FROM drop_reports WHERE report_id = ?1",
              rusqlite::params![report_id],
              |row| {
                Ok(RawDropReport {
                  report_id:   row.get(0)?,
                  stage_id:    row.get(1)?,
                  pattern_id:  row.get(2)?,
                  times:       row.get(3)?,
                  created_at:  row.get(4)?,
                  reliability: row.get(5)?,
                  server:      row.get(6)?,
                  account_id:  row.get(7)?,
                  source_name: row.get(8)?,
                  version:     row.get(9)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawDropReport::into_report).transpose()
  }

  async fn drop_report_extra(&self, report_id: i64) -> Result<Option<DropReportExtra>> {
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT report_id, ip, source_name, version, metadata, md5
               FROM drop_report_extras WHERE report_id = ?1",
              rusqlite::params![report_id],
              |row| {
                Ok(RawDropReportExtra {
                  report_id:   row.get(0)?,
                  ip:          row.get(1)?,
                  source_name: row.get(2)?,
                  version:     row.get(3)?,
                  metadata:    row.get(4)?,
                  md5:         row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawDropReportExtra::into_extra).transpose()
  }

  async fn recall_report(&self, report_id: i64) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE drop_reports SET reliability = ?2
           WHERE report_id = ?1 AND reliability != ?2",
          rusqlite::params![report_id, reliability::RECALLED],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }
}
