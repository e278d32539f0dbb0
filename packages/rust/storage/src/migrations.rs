//! SQL migration definitions for the pack database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its version in `schema_migrations`.

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
        description: "Initial schema: context_packs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per pack; the full document lives in pack_json
CREATE TABLE IF NOT EXISTS context_packs (
    id           TEXT PRIMARY KEY,
    company_name TEXT NOT NULL,
    company_url  TEXT NOT NULL,
    version      TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    pack_json    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_context_packs_created ON context_packs(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
