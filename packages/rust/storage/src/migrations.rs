//! SQL migration definitions for the noteforge database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: records, artifacts",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Source records (one per transcript)
CREATE TABLE IF NOT EXISTS records (
    id             TEXT PRIMARY KEY,
    title          TEXT NOT NULL,
    source_url     TEXT,
    transcript_url TEXT,
    transcript     TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at);

-- Derived artifacts, at most one row per record
CREATE TABLE IF NOT EXISTS artifacts (
    record_id         TEXT PRIMARY KEY REFERENCES records(id) ON DELETE CASCADE,
    document          TEXT NOT NULL,
    summary_primary   TEXT NOT NULL,
    summary_secondary TEXT NOT NULL,
    summary_legacy    TEXT NOT NULL,
    mind_map_json     TEXT NOT NULL,
    tags_json         TEXT NOT NULL,
    content_hash      TEXT NOT NULL,
    model             TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_artifacts_content_hash ON artifacts(content_hash);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
