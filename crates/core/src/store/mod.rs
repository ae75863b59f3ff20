//! Narrow contracts for the two external collaborators.
//!
//! The core depends only on these traits: [`VersionedStore`] (a Dolt-like,
//! SQL-queryable system with commits, branches, and merges) and
//! [`VectorStore`] (a ChromaDB-like document/embedding store organized into
//! named collections). Production implementations live in [`crate::dolt`]
//! and [`crate::chroma`]; tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::errors::{ChromaError, DoltError};
use crate::models::CommitInfo;

/// One row returned from a SQL query against the versioned store.
pub type SqlRow = serde_json::Map<String, JsonValue>;

/// Which side of a conflict to keep when delegating to the store's native
/// per-table resolution primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveSide {
    Ours,
    Theirs,
}

impl ResolveSide {
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Ours => "--ours",
            Self::Theirs => "--theirs",
        }
    }
}

/// Classification of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushKind {
    /// The remote accepted new commits.
    Pushed,
    /// The remote was already at the local head.
    UpToDate,
    /// The push created the branch on the remote.
    NewBranch,
}

/// Outcome of a push that did not error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOutcome {
    pub kind: PushKind,
    pub detail: String,
}

/// Outcome of a merge driven through the versioned store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    /// Hash of the resulting commit (absent while conflicts are unresolved).
    pub merge_commit: Option<String>,
    pub fast_forward: bool,
    /// Number of tables left with conflict markers.
    pub conflict_tables: usize,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.conflict_tables == 0
    }
}

/// A Dolt-like versioned SQL store, consumed through a narrow contract.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Working-directory path identifying this repository.
    fn repo_path(&self) -> &str;

    async fn head_commit(&self) -> Result<String, DoltError>;
    async fn current_branch(&self) -> Result<String, DoltError>;
    async fn list_branches(&self) -> Result<Vec<String>, DoltError>;
    async fn list_remotes(&self) -> Result<Vec<String>, DoltError>;
    async fn log(&self, limit: usize) -> Result<Vec<CommitInfo>, DoltError>;

    /// Check out a ref, optionally creating it as a new branch.
    async fn checkout(&self, ref_name: &str, create_new: bool) -> Result<(), DoltError>;

    /// Stage all working-set changes.
    async fn stage_all(&self) -> Result<(), DoltError>;

    /// Whether the working set has uncommitted changes.
    async fn has_uncommitted_changes(&self) -> Result<bool, DoltError>;

    /// Commit staged changes; returns the new head commit hash.
    async fn commit(&self, message: &str) -> Result<String, DoltError>;

    async fn push(&self, remote: &str, branch: &str) -> Result<PushOutcome, DoltError>;

    /// Merge `source_branch` into the current branch.
    async fn merge(&self, source_branch: &str) -> Result<MergeReport, DoltError>;

    /// Abort an in-progress conflicted merge.
    async fn abort_merge(&self) -> Result<(), DoltError>;

    /// Hard-reset the working set and branch head to `target`.
    async fn reset_hard(&self, target: &str) -> Result<(), DoltError>;

    /// Best common ancestor of two refs.
    async fn merge_base(&self, a: &str, b: &str) -> Result<String, DoltError>;

    /// Run a read query; rows come back as JSON maps.
    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>, DoltError>;

    /// Run a mutating statement; returns the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64, DoltError>;

    /// The store's native merge-conflict preview, if it has one.
    ///
    /// `Ok(None)` means the facility is unavailable (not "no conflicts");
    /// callers must flag analyses that fell back on it.
    async fn preview_merge_conflicts(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Option<JsonValue>, DoltError>;

    /// Raw rows from the per-table conflict structure.
    async fn conflict_rows(&self, table: &str) -> Result<Vec<SqlRow>, DoltError>;

    /// Delegate to the store's native per-table conflict resolution.
    async fn resolve_conflicts(&self, table: &str, side: ResolveSide) -> Result<(), DoltError>;
}

/// One physical record in the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, JsonValue>>,
}

impl VectorRecord {
    pub fn new(id: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document: document.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, JsonValue>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A ChromaDB-like vector store, consumed through a narrow contract.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>, ChromaError>;

    async fn create_collection(
        &self,
        name: &str,
        metadata: Option<serde_json::Map<String, JsonValue>>,
    ) -> Result<(), ChromaError>;

    async fn delete_collection(&self, name: &str) -> Result<(), ChromaError>;

    async fn add_documents(
        &self,
        collection: &str,
        records: &[VectorRecord],
        allow_duplicate_ids: bool,
    ) -> Result<(), ChromaError>;

    async fn update_documents(
        &self,
        collection: &str,
        records: &[VectorRecord],
    ) -> Result<(), ChromaError>;

    async fn delete_documents(&self, collection: &str, ids: &[String]) -> Result<(), ChromaError>;

    /// Fetch records by id, or all records when `ids` is `None`.
    async fn get_documents(
        &self,
        collection: &str,
        ids: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<VectorRecord>, ChromaError>;

    async fn collection_count(&self, collection: &str) -> Result<usize, ChromaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_side_flags() {
        assert_eq!(ResolveSide::Ours.as_flag(), "--ours");
        assert_eq!(ResolveSide::Theirs.as_flag(), "--theirs");
    }

    #[test]
    fn test_merge_report_clean() {
        let clean = MergeReport {
            merge_commit: Some("abc".into()),
            fast_forward: true,
            conflict_tables: 0,
        };
        assert!(clean.is_clean());

        let conflicted = MergeReport {
            merge_commit: None,
            fast_forward: false,
            conflict_tables: 2,
        };
        assert!(!conflicted.is_clean());
    }
}
