//! SQL schema for the Penguin SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.
//!
//! Timestamps are fixed-width RFC 3339 UTC strings with millisecond precision,
//! so lexicographic comparison in SQL matches chronological order.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- ── Catalog ──────────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS zones (
    zone_id     INTEGER PRIMARY KEY,
    ark_zone_id TEXT NOT NULL UNIQUE,
    zone_index  INTEGER NOT NULL DEFAULT 0,
    category    TEXT NOT NULL,
    zone_type   TEXT,
    name        TEXT NOT NULL,
    name_i18n   TEXT NOT NULL DEFAULT '{}',
    existence   TEXT NOT NULL DEFAULT '{}',
    background  TEXT
);

CREATE TABLE IF NOT EXISTS stages (
    stage_id           INTEGER PRIMARY KEY,
    ark_stage_id       TEXT NOT NULL UNIQUE,
    zone_id            INTEGER NOT NULL REFERENCES zones(zone_id),
    stage_type         TEXT NOT NULL,
    code               TEXT NOT NULL,
    code_i18n          TEXT NOT NULL DEFAULT '{}',
    sanity             INTEGER,
    existence          TEXT NOT NULL DEFAULT '{}',
    min_clear_time     INTEGER,
    extra_process_type TEXT           -- 'GACHABOX' or NULL
);

CREATE TABLE IF NOT EXISTS items (
    item_id     INTEGER PRIMARY KEY,
    ark_item_id TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    name_i18n   TEXT NOT NULL DEFAULT '{}',
    existence   TEXT NOT NULL DEFAULT '{}',
    item_type   TEXT NOT NULL,
    group_id    TEXT,
    sort_id     INTEGER NOT NULL DEFAULT 0,
    rarity      INTEGER NOT NULL DEFAULT 0,
    keywords    TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS time_ranges (
    range_id   INTEGER PRIMARY KEY,
    server     TEXT NOT NULL,
    name       TEXT,
    start_time TEXT NOT NULL,
    end_time   TEXT NOT NULL
);

-- item_id NULL bounds a whole drop type rather than one item.
CREATE TABLE IF NOT EXISTS drop_infos (
    drop_id     INTEGER PRIMARY KEY,
    server      TEXT NOT NULL,
    stage_id    INTEGER NOT NULL REFERENCES stages(stage_id),
    item_id     INTEGER REFERENCES items(item_id),
    drop_type   TEXT NOT NULL,
    range_id    INTEGER NOT NULL REFERENCES time_ranges(range_id),
    accumulable INTEGER NOT NULL DEFAULT 1,
    bounds      TEXT              -- JSON {lower, upper, exceptions}
);

CREATE TABLE IF NOT EXISTS activities (
    activity_id INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    name_i18n   TEXT NOT NULL DEFAULT '{}',
    start_time  TEXT NOT NULL,
    end_time    TEXT,
    existence   TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS notices (
    notice_id    INTEGER PRIMARY KEY,
    existence    TEXT NOT NULL DEFAULT '{}',
    priority     INTEGER NOT NULL DEFAULT 0,
    content_i18n TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS properties (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL         -- JSON document
);

-- ── Ingestion ────────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS accounts (
    account_id INTEGER PRIMARY KEY,
    penguin_id TEXT NOT NULL UNIQUE,
    weight     REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL
);

-- hash is the canonical identity of a pattern; never reused.
CREATE TABLE IF NOT EXISTS drop_patterns (
    pattern_id           INTEGER PRIMARY KEY,
    hash                 TEXT NOT NULL UNIQUE,
    original_fingerprint TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS drop_pattern_elements (
    pattern_id INTEGER NOT NULL REFERENCES drop_patterns(pattern_id),
    item_id    INTEGER NOT NULL,
    quantity   INTEGER NOT NULL,
    PRIMARY KEY (pattern_id, item_id)
);

-- reliability: 0 trusted, -1 recalled, >0 flagged by a verifier.
CREATE TABLE IF NOT EXISTS drop_reports (
    report_id   INTEGER PRIMARY KEY,
    stage_id    INTEGER NOT NULL REFERENCES stages(stage_id),
    pattern_id  INTEGER NOT NULL REFERENCES drop_patterns(pattern_id),
    times       INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    reliability INTEGER NOT NULL DEFAULT 0,
    server      TEXT NOT NULL,
    account_id  INTEGER NOT NULL,
    source_name TEXT NOT NULL,
    version     TEXT NOT NULL,
    task_id     TEXT NOT NULL,
    task_index  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS drop_report_extras (
    report_id   INTEGER PRIMARY KEY REFERENCES drop_reports(report_id),
    ip          TEXT NOT NULL,
    source_name TEXT NOT NULL,
    version     TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}',
    md5         TEXT
);

CREATE TABLE IF NOT EXISTS reject_rules (
    rule_id          INTEGER PRIMARY KEY,
    status           TEXT NOT NULL DEFAULT 'active',
    expr             TEXT NOT NULL,
    with_reliability INTEGER NOT NULL
);

-- ── Aggregates (written by offline jobs) ─────────────────────────────────────

CREATE TABLE IF NOT EXISTS drop_matrix_elements (
    element_id       INTEGER PRIMARY KEY,
    server           TEXT NOT NULL,
    stage_id         INTEGER NOT NULL,
    item_id          INTEGER NOT NULL,
    range_id         INTEGER NOT NULL REFERENCES time_ranges(range_id),
    quantity         INTEGER NOT NULL,
    times            INTEGER NOT NULL,
    quantity_buckets TEXT NOT NULL DEFAULT '{}',
    source_category  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pattern_matrix_elements (
    element_id      INTEGER PRIMARY KEY,
    server          TEXT NOT NULL,
    stage_id        INTEGER NOT NULL,
    pattern_id      INTEGER NOT NULL REFERENCES drop_patterns(pattern_id),
    range_id        INTEGER NOT NULL REFERENCES time_ranges(range_id),
    quantity        INTEGER NOT NULL,
    times           INTEGER NOT NULL,
    source_category TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trend_elements (
    element_id      INTEGER PRIMARY KEY,
    server          TEXT NOT NULL,
    stage_id        INTEGER NOT NULL,
    item_id         INTEGER NOT NULL,
    group_id        INTEGER NOT NULL,
    start_time      TEXT NOT NULL,
    end_time        TEXT NOT NULL,
    quantity        INTEGER NOT NULL,
    times           INTEGER NOT NULL,
    source_category TEXT NOT NULL DEFAULT 'all'
);

CREATE TABLE IF NOT EXISTS snapshots (
    server     TEXT NOT NULL,
    realm      TEXT NOT NULL,
    version    INTEGER NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (server, realm, version)
);

-- ── Key/value collaborator ───────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY,
    value      BLOB NOT NULL,
    expires_at INTEGER NOT NULL   -- epoch milliseconds
);

CREATE INDEX IF NOT EXISTS drop_infos_stage_idx     ON drop_infos(server, stage_id);
CREATE INDEX IF NOT EXISTS drop_reports_stage_idx   ON drop_reports(server, stage_id, created_at);
CREATE INDEX IF NOT EXISTS drop_reports_account_idx ON drop_reports(account_id);
CREATE UNIQUE INDEX IF NOT EXISTS drop_reports_task_idx
    ON drop_reports(task_id, task_index);
CREATE UNIQUE INDEX IF NOT EXISTS drop_report_extras_md5_idx
    ON drop_report_extras(md5) WHERE md5 IS NOT NULL;
CREATE INDEX IF NOT EXISTS drop_matrix_server_idx   ON drop_matrix_elements(server, source_category);
CREATE INDEX IF NOT EXISTS pattern_matrix_server_idx ON pattern_matrix_elements(server, source_category);
CREATE INDEX IF NOT EXISTS trend_server_idx         ON trend_elements(server);

PRAGMA user_version = 1;
";
