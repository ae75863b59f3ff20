//! Deletion tracking service.
//!
//! The [`DeletionTracker`] maintains a persistent ledger of document
//! deletions that is independent of the Dolt repository's branch state.
//! Checkout, reset, and merge can all resurrect rows from history; the
//! ledger is what remembers that a deletion was intended on a given branch
//! so the vector store is not left holding documents the repository no
//! longer has -- and, just as important, so a discarded deletion never
//! fires against a document the repository restored.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::errors::DatabaseError;
use crate::models::{DeletionRecord, DeletionStatus};

/// Persistent tracker for document deletions pending propagation to the
/// vector store.
///
/// All mutating calls are atomic per `(repo_path, doc_id, collection)`;
/// storage errors propagate to the caller while logical no-ops (discarding
/// nothing, cleaning nothing) succeed silently.
pub struct DeletionTracker {
    db: Arc<Database>,
}

impl DeletionTracker {
    /// Create a tracker over an opened ledger database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Access the underlying ledger (for status/audit queries).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Idempotently prepare ledger storage for a repository.
    ///
    /// Runs pending schema migrations and stamps the repository as known.
    /// Failure to create or open the ledger surfaces as
    /// [`DatabaseError::StorageInit`] / [`DatabaseError::MigrationFailed`].
    pub fn initialize(&self, repo_path: &str) -> Result<(), DatabaseError> {
        self.db.initialize()?;
        self.db
            .set_state(&format!("ledger_initialized:{repo_path}"), "1")?;
        info!(repo_path, "deletion ledger initialized");
        Ok(())
    }

    /// Record intent to delete a document.
    ///
    /// Overwrites any existing non-committed record for the same
    /// `(repo_path, doc_id, collection)` key rather than creating a
    /// duplicate; the original content hash and metadata are captured so a
    /// later reconciliation can still identify what was deleted.
    #[allow(clippy::too_many_arguments)]
    pub fn track_deletion(
        &self,
        repo_path: &str,
        doc_id: &str,
        collection: &str,
        original_content_hash: &str,
        original_metadata: &BTreeMap<String, JsonValue>,
        branch_context: &str,
        base_commit_hash: &str,
    ) -> Result<i64, DatabaseError> {
        let id = self.db.upsert_deletion_record(
            repo_path,
            doc_id,
            collection,
            original_content_hash,
            original_metadata,
            branch_context,
            base_commit_hash,
        )?;
        debug!(
            repo_path,
            doc_id, collection, branch_context, "tracked deletion"
        );
        Ok(id)
    }

    /// All non-committed records for a repository, optionally filtered by
    /// collection, in insertion order.
    pub fn get_pending_deletions(
        &self,
        repo_path: &str,
        collection: Option<&str>,
    ) -> Result<Vec<DeletionRecord>, DatabaseError> {
        self.db.list_pending_deletions(repo_path, collection)
    }

    /// Mark one record as part of a staged commit.
    pub fn mark_deletion_staged(&self, record_id: i64) -> Result<(), DatabaseError> {
        self.transition(record_id, DeletionStatus::Staged)
    }

    /// Mark one record as committed. This is the terminal state prior to
    /// cleanup -- and the point of no return for the deletion.
    pub fn mark_deletion_committed(&self, record_id: i64) -> Result<(), DatabaseError> {
        self.transition(record_id, DeletionStatus::Committed)
    }

    fn transition(&self, record_id: i64, status: DeletionStatus) -> Result<(), DatabaseError> {
        if !self.db.set_deletion_status(record_id, status)? {
            return Err(DatabaseError::NotFound {
                entity: "deletion record".into(),
                id: record_id.to_string(),
            });
        }
        Ok(())
    }

    /// Move every record on a branch through a bulk status transition
    /// (used by the commit flow: pending -> staged -> committed).
    pub fn transition_branch(
        &self,
        repo_path: &str,
        branch: &str,
        from: DeletionStatus,
        to: DeletionStatus,
    ) -> Result<usize, DatabaseError> {
        self.db
            .set_branch_deletions_status(repo_path, branch, from, to)
    }

    /// Remove records already marked committed. Safe to call repeatedly;
    /// a no-op when none are committed.
    pub fn cleanup_committed_deletions(&self, repo_path: &str) -> Result<usize, DatabaseError> {
        self.db.cleanup_committed_deletions(repo_path)
    }

    /// Decide what happens to pending deletions when the repository moves
    /// between branches (checkout, merge, pull).
    ///
    /// With `keep_changes` the records follow the checkout: their branch
    /// context is rewritten to the destination branch and its commit. With
    /// `keep_changes == false` (e.g. a hard reset) the records belonging to
    /// the source branch are discarded so they can never fire against
    /// documents the destination branch still has.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_branch_change(
        &self,
        repo_path: &str,
        from_branch: &str,
        to_branch: &str,
        _from_commit: &str,
        to_commit: &str,
        keep_changes: bool,
    ) -> Result<usize, DatabaseError> {
        let affected = if keep_changes {
            let moved =
                self.db
                    .rewrite_deletions_branch(repo_path, from_branch, to_branch, to_commit)?;
            if moved > 0 {
                info!(
                    repo_path,
                    from_branch, to_branch, moved, "carried pending deletions across checkout"
                );
            }
            moved
        } else {
            let discarded = self.db.discard_deletions_for_branch(repo_path, from_branch)?;
            if discarded > 0 {
                info!(
                    repo_path,
                    from_branch, discarded, "discarded pending deletions on branch change"
                );
            }
            discarded
        };
        Ok(affected)
    }

    /// Remove all pending records whose branch context matches `branch`.
    /// Records for other branches are untouched.
    pub fn discard_pending_deletions_for_branch(
        &self,
        repo_path: &str,
        branch: &str,
    ) -> Result<usize, DatabaseError> {
        self.db.discard_deletions_for_branch(repo_path, branch)
    }

    /// Remove one record by identity. Returns `true` if a record was
    /// removed; discarding a missing record is a silent no-op.
    pub fn discard_deletion(&self, record_id: i64) -> Result<bool, DatabaseError> {
        self.db.discard_deletion(record_id)
    }

    /// Existence check used to avoid re-deleting, or to cancel a pending
    /// deletion when the document is re-added before commit.
    pub fn has_pending_deletion(
        &self,
        repo_path: &str,
        doc_id: &str,
        collection: &str,
    ) -> Result<bool, DatabaseError> {
        self.db.has_pending_deletion(repo_path, doc_id, collection)
    }

    /// Rewrite a pending record's branch context and base commit without
    /// losing the captured content hash and metadata (used when the branch
    /// advances while the deletion is still pending).
    pub fn update_deletion_context(
        &self,
        repo_path: &str,
        doc_id: &str,
        collection: &str,
        new_branch_context: &str,
        new_base_commit: &str,
    ) -> Result<bool, DatabaseError> {
        self.db.update_deletion_context(
            repo_path,
            doc_id,
            collection,
            new_branch_context,
            new_base_commit,
        )
    }

    /// Garbage-collect records referencing branches that no longer exist.
    ///
    /// Best-effort: per-branch failures are logged and skipped, and a
    /// repository with no stale state is a silent no-op. Returns the number
    /// of records discarded.
    pub fn cleanup_stale_sync_states(
        &self,
        repo_path: &str,
        live_branches: &[String],
    ) -> Result<usize, DatabaseError> {
        let tracked = self.db.list_deletion_branches(repo_path)?;
        let mut discarded = 0;
        for branch in tracked {
            if live_branches.iter().any(|b| b == &branch) {
                continue;
            }
            match self.db.discard_deletions_for_branch(repo_path, &branch) {
                Ok(n) => {
                    if n > 0 {
                        warn!(
                            repo_path,
                            branch, count = n, "discarded deletions for vanished branch"
                        );
                        discarded += n;
                    }
                }
                Err(e) => {
                    warn!(repo_path, branch, error = %e, "stale-state cleanup failed for branch");
                }
            }
        }
        Ok(discarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> DeletionTracker {
        let db = Arc::new(Database::in_memory().unwrap());
        let t = DeletionTracker::new(db);
        t.initialize("/repo").unwrap();
        t
    }

    fn track(t: &DeletionTracker, doc: &str, branch: &str) -> i64 {
        t.track_deletion(
            "/repo",
            doc,
            "notes",
            "hash",
            &BTreeMap::new(),
            branch,
            "commit-0",
        )
        .unwrap()
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let t = tracker();
        t.initialize("/repo").unwrap();
        t.initialize("/repo").unwrap();
    }

    #[test]
    fn test_deletion_discarded_on_branch_change_without_keep() {
        let t = tracker();
        track(&t, "doc-1", "feature");

        // Leave the branch, dropping work in progress.
        t.handle_branch_change("/repo", "feature", "main", "c-f", "c-m", false)
            .unwrap();

        // Coming back to the branch finds no stale pending deletion, so the
        // document cannot be wrongly deleted if it was re-added elsewhere.
        assert!(!t.has_pending_deletion("/repo", "doc-1", "notes").unwrap());
        assert!(t.get_pending_deletions("/repo", None).unwrap().is_empty());
    }

    #[test]
    fn test_deletion_follows_checkout_with_keep() {
        let t = tracker();
        track(&t, "doc-1", "feature");

        let moved = t
            .handle_branch_change("/repo", "feature", "main", "c-f", "c-m", true)
            .unwrap();
        assert_eq!(moved, 1);

        let pending = t.get_pending_deletions("/repo", None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].branch_context, "main");
        assert_eq!(pending[0].base_commit_hash, "c-m");
    }

    #[test]
    fn test_discard_is_branch_scoped() {
        let t = tracker();
        let b1_ids = vec![track(&t, "doc-a", "b1"), track(&t, "doc-b", "b1")];
        let b2_id = track(&t, "doc-c", "b2");

        let removed = t
            .discard_pending_deletions_for_branch("/repo", "b1")
            .unwrap();
        assert_eq!(removed, 2);

        let remaining = t.get_pending_deletions("/repo", None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b2_id);
        for id in b1_ids {
            assert!(t.db().get_deletion_record(id).unwrap().is_none());
        }
    }

    #[test]
    fn test_staged_committed_cleanup_flow() {
        let t = tracker();
        let id = track(&t, "doc-1", "main");

        t.mark_deletion_staged(id).unwrap();
        t.mark_deletion_committed(id).unwrap();
        assert!(t.get_pending_deletions("/repo", None).unwrap().is_empty());

        assert_eq!(t.cleanup_committed_deletions("/repo").unwrap(), 1);
        assert_eq!(t.cleanup_committed_deletions("/repo").unwrap(), 0);
    }

    #[test]
    fn test_transition_missing_record_is_error() {
        let t = tracker();
        let err = t.mark_deletion_staged(9999).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn test_discard_missing_record_is_silent() {
        let t = tracker();
        assert!(!t.discard_deletion(9999).unwrap());
    }

    #[test]
    fn test_re_add_cancels_pending_deletion() {
        let t = tracker();
        let id = track(&t, "doc-1", "main");

        // The document reappears before commit; the pending record is
        // cancelled by identity.
        assert!(t.has_pending_deletion("/repo", "doc-1", "notes").unwrap());
        assert!(t.discard_deletion(id).unwrap());
        assert!(!t.has_pending_deletion("/repo", "doc-1", "notes").unwrap());
    }

    #[test]
    fn test_cleanup_stale_sync_states() {
        let t = tracker();
        track(&t, "doc-1", "main");
        track(&t, "doc-2", "vanished");

        let live = vec!["main".to_string()];
        let discarded = t.cleanup_stale_sync_states("/repo", &live).unwrap();
        assert_eq!(discarded, 1);

        let pending = t.get_pending_deletions("/repo", None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].branch_context, "main");

        // No stale state left: silent no-op.
        assert_eq!(t.cleanup_stale_sync_states("/repo", &live).unwrap(), 0);
    }
}
