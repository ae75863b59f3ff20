//! Domain model types used throughout doltvec.
//!
//! These types bridge the sync manager, deletion ledger, conflict subsystem,
//! and the MCP tool layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ---------------------------------------------------------------------------
// Sync outcome
// ---------------------------------------------------------------------------

/// Status of a completed orchestration call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncOpStatus {
    /// The operation completed and the vector store was reconciled.
    Completed,
    /// The operation failed before any store was mutated.
    Failed,
    /// The underlying operation succeeded but some collections failed to sync.
    PartialFailure,
    /// There was nothing to do (e.g. commit with no pending changes).
    NoChanges,
    /// A merge stopped on conflicts; see the attached analysis.
    Conflicts,
    /// A push found the remote already at the local head.
    UpToDate,
}

impl std::fmt::Display for SyncOpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::PartialFailure => write!(f, "partial_failure"),
            Self::NoChanges => write!(f, "no_changes"),
            Self::Conflicts => write!(f, "conflicts"),
            Self::UpToDate => write!(f, "up_to_date"),
        }
    }
}

/// Document-level change counts reported by an orchestration call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

/// Result object returned from every sync-manager entry point.
///
/// Failures carry a stable `error_code` and enough context for the caller
/// to decide on retry or escalation; errors are never thrown past the
/// orchestration boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub status: SyncOpStatus,
    pub message: String,
    /// Stable machine-readable failure code, e.g. `"no_changes"`,
    /// `"remote_rejected"`, `"authentication_failed"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub counts: ChangeCounts,
    /// Collections that failed to sync in a partial failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_collections: Vec<String>,
}

impl SyncOutcome {
    /// Successful outcome with a message.
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: SyncOpStatus::Completed,
            message: message.into(),
            error_code: None,
            commit_hash: None,
            branch: None,
            counts: ChangeCounts::default(),
            failed_collections: Vec::new(),
        }
    }

    /// Reported no-op (precondition failure that is not an error).
    pub fn no_changes(message: impl Into<String>) -> Self {
        Self {
            status: SyncOpStatus::NoChanges,
            message: message.into(),
            error_code: Some("no_changes".into()),
            commit_hash: None,
            branch: None,
            counts: ChangeCounts::default(),
            failed_collections: Vec::new(),
        }
    }

    /// Failure outcome with a stable code.
    pub fn failed(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: SyncOpStatus::Failed,
            message: message.into(),
            error_code: Some(code.to_string()),
            commit_hash: None,
            branch: None,
            counts: ChangeCounts::default(),
            failed_collections: Vec::new(),
        }
    }

    pub fn with_commit(mut self, hash: impl Into<String>) -> Self {
        self.commit_hash = Some(hash.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_counts(mut self, counts: ChangeCounts) -> Self {
        self.counts = counts;
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            SyncOpStatus::Completed | SyncOpStatus::NoChanges | SyncOpStatus::UpToDate
        )
    }
}

// ---------------------------------------------------------------------------
// Diff rows
// ---------------------------------------------------------------------------

/// Classification of a single document-level change between two commits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Added,
    Modified,
    Removed,
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// One row-level change surfaced by the delta detector.
///
/// Computed fresh per diff; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffRow {
    pub doc_id: String,
    pub collection: String,
    pub title: String,
    pub diff_type: DiffType,
}

// ---------------------------------------------------------------------------
// Deletion records
// ---------------------------------------------------------------------------

/// Lifecycle status of a tracked deletion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    /// Recorded but not yet part of a staged commit.
    Pending,
    /// Included in the staged change set of an in-flight commit.
    Staged,
    /// The commit landed; eligible for cleanup.
    Committed,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Staged => "staged",
            Self::Committed => "committed",
        }
    }

    /// Parse a status string stored in the ledger.
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "staged" => Self::Staged,
            "committed" => Self::Committed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for DeletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document deletion pending propagation to the vector store.
///
/// Owned exclusively by the deletion ledger; at most one non-committed
/// record exists per `(repo_path, doc_id, collection)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRecord {
    /// Ledger row id (monotonic).
    pub id: i64,
    pub repo_path: String,
    pub doc_id: String,
    pub collection: String,
    pub original_content_hash: String,
    /// Metadata captured at deletion time, keyed by field name.
    pub original_metadata: BTreeMap<String, JsonValue>,
    /// Branch the deletion was observed on.
    pub branch_context: String,
    /// Commit the branch pointed at when the deletion was observed.
    pub base_commit_hash: String,
    pub status: DeletionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Commit / log info
// ---------------------------------------------------------------------------

/// A single commit in the versioned store's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub committer: String,
    pub message: String,
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_builders() {
        let ok = SyncOutcome::completed("merged cleanly")
            .with_commit("abc123")
            .with_branch("main")
            .with_counts(ChangeCounts {
                added: 1,
                modified: 2,
                deleted: 3,
            });
        assert_eq!(ok.status, SyncOpStatus::Completed);
        assert!(ok.is_success());
        assert_eq!(ok.counts.total(), 6);
        assert_eq!(ok.commit_hash.as_deref(), Some("abc123"));

        let noop = SyncOutcome::no_changes("nothing to commit");
        assert_eq!(noop.status, SyncOpStatus::NoChanges);
        assert!(noop.is_success());
        assert_eq!(noop.error_code.as_deref(), Some("no_changes"));

        let failed = SyncOutcome::failed("remote_rejected", "push rejected");
        assert!(!failed.is_success());
        assert_eq!(failed.error_code.as_deref(), Some("remote_rejected"));
    }

    #[test]
    fn test_deletion_status_round_trip() {
        for status in [
            DeletionStatus::Pending,
            DeletionStatus::Staged,
            DeletionStatus::Committed,
        ] {
            assert_eq!(DeletionStatus::from_str_val(status.as_str()), status);
        }
        // Unknown strings degrade to pending.
        assert_eq!(
            DeletionStatus::from_str_val("garbage"),
            DeletionStatus::Pending
        );
    }

    #[test]
    fn test_diff_type_display() {
        assert_eq!(DiffType::Added.to_string(), "added");
        assert_eq!(DiffType::Modified.to_string(), "modified");
        assert_eq!(DiffType::Removed.to_string(), "removed");
    }
}
