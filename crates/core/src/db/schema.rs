//! Ledger schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The SQLite
//! `user_version` pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
/// Versions start at 1.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "initial ledger schema",
        r#"
        CREATE TABLE IF NOT EXISTS deletion_records (
            id                    INTEGER PRIMARY KEY AUTOINCREMENT,
            repo_path             TEXT NOT NULL,
            doc_id                TEXT NOT NULL,
            collection            TEXT NOT NULL,
            original_content_hash TEXT NOT NULL DEFAULT '',
            original_metadata     TEXT NOT NULL DEFAULT '{}',
            branch_context        TEXT NOT NULL,
            base_commit_hash      TEXT NOT NULL DEFAULT '',
            status                TEXT NOT NULL DEFAULT 'pending'
                                  CHECK (status IN ('pending', 'staged', 'committed')),
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );

        -- At most one non-committed record per (repo, doc, collection).
        CREATE UNIQUE INDEX IF NOT EXISTS idx_deletion_records_active_key
            ON deletion_records (repo_path, doc_id, collection)
            WHERE status != 'committed';

        CREATE INDEX IF NOT EXISTS idx_deletion_records_repo
            ON deletion_records (repo_path);
        CREATE INDEX IF NOT EXISTS idx_deletion_records_branch
            ON deletion_records (repo_path, branch_context);

        CREATE TABLE IF NOT EXISTS kv_state (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            action      TEXT NOT NULL,
            repo_path   TEXT,
            branch      TEXT,
            commit_hash TEXT,
            details     TEXT,
            success     INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log (created_at);
        CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log (action);
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking ledger migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
