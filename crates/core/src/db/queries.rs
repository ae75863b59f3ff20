//! Typed query helpers for every table in the deletion ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::models::{DeletionRecord, DeletionStatus};

/// A row from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub repo_path: Option<String>,
    pub branch: Option<String>,
    pub commit_hash: Option<String>,
    pub details: Option<String>,
    pub success: bool,
    pub created_at: String,
}

fn row_to_deletion_record(row: &Row<'_>) -> rusqlite::Result<DeletionRecord> {
    let metadata_json: String = row.get(5)?;
    let metadata: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_json).unwrap_or_default();
    let status: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(DeletionRecord {
        id: row.get(0)?,
        repo_path: row.get(1)?,
        doc_id: row.get(2)?,
        collection: row.get(3)?,
        original_content_hash: row.get(4)?,
        original_metadata: metadata,
        branch_context: row.get(6)?,
        base_commit_hash: row.get(7)?,
        status: DeletionStatus::from_str_val(&status),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const DELETION_COLUMNS: &str = "id, repo_path, doc_id, collection, original_content_hash, \
     original_metadata, branch_context, base_commit_hash, status, created_at, updated_at";

impl Database {
    // -- deletion_records ---------------------------------------------------

    /// Insert or update the active (non-committed) deletion record for the
    /// given key. A later deletion of the same document rewrites context and
    /// resets status to pending rather than creating a duplicate.
    pub fn upsert_deletion_record(
        &self,
        repo_path: &str,
        doc_id: &str,
        collection: &str,
        original_content_hash: &str,
        original_metadata: &BTreeMap<String, serde_json::Value>,
        branch_context: &str,
        base_commit_hash: &str,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let metadata_json =
            serde_json::to_string(original_metadata).unwrap_or_else(|_| "{}".to_string());

        self.transaction(|conn| {
            let updated = conn.execute(
                "UPDATE deletion_records
                 SET original_content_hash = ?4, original_metadata = ?5,
                     branch_context = ?6, base_commit_hash = ?7,
                     status = 'pending', updated_at = ?8
                 WHERE repo_path = ?1 AND doc_id = ?2 AND collection = ?3
                   AND status != 'committed'",
                params![
                    repo_path,
                    doc_id,
                    collection,
                    original_content_hash,
                    metadata_json,
                    branch_context,
                    base_commit_hash,
                    now
                ],
            )?;

            if updated > 0 {
                let id: i64 = conn.query_row(
                    "SELECT id FROM deletion_records
                     WHERE repo_path = ?1 AND doc_id = ?2 AND collection = ?3
                       AND status != 'committed'",
                    params![repo_path, doc_id, collection],
                    |row| row.get(0),
                )?;
                debug!(id, doc_id, collection, "updated existing deletion record");
                return Ok(id);
            }

            conn.execute(
                "INSERT INTO deletion_records
                 (repo_path, doc_id, collection, original_content_hash, original_metadata,
                  branch_context, base_commit_hash, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
                params![
                    repo_path,
                    doc_id,
                    collection,
                    original_content_hash,
                    metadata_json,
                    branch_context,
                    base_commit_hash,
                    now
                ],
            )?;
            let id = conn.last_insert_rowid();
            debug!(id, doc_id, collection, "inserted deletion record");
            Ok(id)
        })
    }

    /// Fetch one deletion record by id.
    pub fn get_deletion_record(&self, id: i64) -> Result<Option<DeletionRecord>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DELETION_COLUMNS} FROM deletion_records WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], row_to_deletion_record)?;
        match rows.next() {
            Some(Ok(rec)) => Ok(Some(rec)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// All non-committed records for a repository, optionally filtered by
    /// collection, in insertion order (stable for reproducible tests).
    pub fn list_pending_deletions(
        &self,
        repo_path: &str,
        collection: Option<&str>,
    ) -> Result<Vec<DeletionRecord>, DatabaseError> {
        let conn = self.conn();
        let records = match collection {
            Some(coll) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DELETION_COLUMNS} FROM deletion_records
                     WHERE repo_path = ?1 AND collection = ?2 AND status != 'committed'
                     ORDER BY id"
                ))?;
                let rows = stmt.query_map(params![repo_path, coll], row_to_deletion_record)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DELETION_COLUMNS} FROM deletion_records
                     WHERE repo_path = ?1 AND status != 'committed'
                     ORDER BY id"
                ))?;
                let rows = stmt.query_map(params![repo_path], row_to_deletion_record)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    /// Transition one record to a new status. Returns `false` if the record
    /// does not exist.
    pub fn set_deletion_status(
        &self,
        id: i64,
        status: DeletionStatus,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE deletion_records SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now],
        )?;
        Ok(updated > 0)
    }

    /// Transition every record on a branch from one status to another.
    /// Returns the number of records moved.
    pub fn set_branch_deletions_status(
        &self,
        repo_path: &str,
        branch: &str,
        from: DeletionStatus,
        to: DeletionStatus,
    ) -> Result<usize, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE deletion_records SET status = ?4, updated_at = ?5
             WHERE repo_path = ?1 AND branch_context = ?2 AND status = ?3",
            params![repo_path, branch, from.as_str(), to.as_str(), now],
        )?;
        Ok(updated)
    }

    /// Remove records already marked committed. Idempotent.
    pub fn cleanup_committed_deletions(&self, repo_path: &str) -> Result<usize, DatabaseError> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM deletion_records WHERE repo_path = ?1 AND status = 'committed'",
            params![repo_path],
        )?;
        if deleted > 0 {
            debug!(repo_path, deleted, "cleaned up committed deletion records");
        }
        Ok(deleted)
    }

    /// Remove all non-committed records whose branch context matches.
    /// Records on other branches are untouched.
    pub fn discard_deletions_for_branch(
        &self,
        repo_path: &str,
        branch: &str,
    ) -> Result<usize, DatabaseError> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM deletion_records
             WHERE repo_path = ?1 AND branch_context = ?2 AND status != 'committed'",
            params![repo_path, branch],
        )?;
        Ok(deleted)
    }

    /// Remove one record by identity. Returns `false` if it did not exist.
    pub fn discard_deletion(&self, id: i64) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM deletion_records WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Existence check for a non-committed record.
    pub fn has_pending_deletion(
        &self,
        repo_path: &str,
        doc_id: &str,
        collection: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM deletion_records
             WHERE repo_path = ?1 AND doc_id = ?2 AND collection = ?3
               AND status != 'committed'",
            params![repo_path, doc_id, collection],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Rewrite branch context and base commit for one record without touching
    /// its captured content hash or metadata. Returns `false` when no
    /// non-committed record matches the key.
    pub fn update_deletion_context(
        &self,
        repo_path: &str,
        doc_id: &str,
        collection: &str,
        new_branch: &str,
        new_base_commit: &str,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE deletion_records
             SET branch_context = ?4, base_commit_hash = ?5, updated_at = ?6
             WHERE repo_path = ?1 AND doc_id = ?2 AND collection = ?3
               AND status != 'committed'",
            params![repo_path, doc_id, collection, new_branch, new_base_commit, now],
        )?;
        Ok(updated > 0)
    }

    /// Move every non-committed record from one branch context to another
    /// (used when pending work follows a checkout). Returns the count moved.
    pub fn rewrite_deletions_branch(
        &self,
        repo_path: &str,
        from_branch: &str,
        to_branch: &str,
        new_base_commit: &str,
    ) -> Result<usize, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE deletion_records
             SET branch_context = ?3, base_commit_hash = ?4, updated_at = ?5
             WHERE repo_path = ?1 AND branch_context = ?2 AND status != 'committed'",
            params![repo_path, from_branch, to_branch, new_base_commit, now],
        )?;
        Ok(updated)
    }

    /// Distinct branch contexts that still have non-committed records.
    pub fn list_deletion_branches(&self, repo_path: &str) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT branch_context FROM deletion_records
             WHERE repo_path = ?1 AND status != 'committed'
             ORDER BY branch_context",
        )?;
        let branches = stmt
            .query_map(params![repo_path], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(branches)
    }

    // -- kv_state -----------------------------------------------------------

    /// Upsert a key/value state entry.
    pub fn set_state(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;
        Ok(())
    }

    /// Read a key/value state entry.
    pub fn get_state(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM kv_state WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get(0))?;
        match rows.next() {
            Some(Ok(val)) => Ok(Some(val)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    // -- audit_log ----------------------------------------------------------

    /// Append an audit-log entry.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_audit_entry(
        &self,
        action: &str,
        repo_path: Option<&str>,
        branch: Option<&str>,
        commit_hash: Option<&str>,
        details: Option<&str>,
        success: bool,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log (action, repo_path, branch, commit_hash, details, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![action, repo_path, branch, commit_hash, details, success as i64, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent N audit entries, newest first.
    pub fn list_audit_entries(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, repo_path, branch, commit_hash, details, success, created_at
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditLogEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    repo_path: row.get(2)?,
                    branch: row.get(3)?,
                    commit_hash: row.get(4)?,
                    details: row.get(5)?,
                    success: row.get::<_, i64>(6)? != 0,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
