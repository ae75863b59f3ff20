//! Synchronization orchestrator.
//!
//! The [`SyncManager`] drives the commit, push, merge, and reset workflows,
//! keeping the vector store aligned with the versioned store. The versioned
//! store is the source of truth; the vector store is a derived projection;
//! the deletion ledger is the only durable record of intent-to-delete that
//! bridges the two across branch operations.
//!
//! Every entry point returns a [`SyncOutcome`] result object -- errors are
//! wrapped with context and surfaced as failure outcomes with stable codes,
//! never thrown past this boundary. Partial progress (collections already
//! synced before one failed) is not rolled back: the design favors eventual
//! reconciliation over cross-collection atomicity.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::chroma::chunk;
use crate::conflict::{ConflictAnalyzer, ConflictResolver, DetailedConflictInfo};
use crate::deletion::DeletionTracker;
use crate::diff::{DeltaDetector, DeltaScan};
use crate::dolt::parser::{row_string, sql_quote};
use crate::errors::{ChromaError, ConflictError, DatabaseError, DoltError, SyncError};
use crate::models::{ChangeCounts, DiffRow, DiffType, SyncOutcome};
use crate::store::{PushKind, VectorRecord, VectorStore, VersionedStore};

/// Outcome of a merge, including analyzer findings when it was not clean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub outcome: SyncOutcome,
    /// Unresolved conflicts left in the working set, if any.
    pub conflicts: Vec<DetailedConflictInfo>,
    /// How many conflicts the auto-resolution pass cleared.
    pub auto_resolved: usize,
}

/// Snapshot of repository/ledger state for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub repo_path: String,
    pub branch: String,
    pub head_commit: String,
    pub collections: Vec<String>,
    pub pending_deletions: usize,
    pub last_synced_commit: Option<String>,
}

/// Orchestrates the versioned store, the vector store, and the deletion
/// ledger. One instance per repository; operations on the same instance are
/// single-flight.
pub struct SyncManager {
    dolt: Arc<dyn VersionedStore>,
    chroma: Arc<dyn VectorStore>,
    tracker: Arc<DeletionTracker>,
    detector: DeltaDetector,
    analyzer: ConflictAnalyzer,
    resolver: ConflictResolver,
    chunk_separator: String,
    auto_resolve: bool,
    /// Serializes commit/merge/reset against this repository.
    op_guard: tokio::sync::Mutex<()>,
}

impl SyncManager {
    pub fn new(
        dolt: Arc<dyn VersionedStore>,
        chroma: Arc<dyn VectorStore>,
        tracker: Arc<DeletionTracker>,
        chunk_separator: impl Into<String>,
        auto_resolve: bool,
    ) -> Self {
        info!(repo = %dolt.repo_path(), "initializing sync manager");
        Self {
            detector: DeltaDetector::new(dolt.clone()),
            analyzer: ConflictAnalyzer::new(dolt.clone()),
            resolver: ConflictResolver::new(dolt.clone()),
            dolt,
            chroma,
            tracker,
            chunk_separator: chunk_separator.into(),
            auto_resolve,
            op_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn analyzer(&self) -> &ConflictAnalyzer {
        &self.analyzer
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub fn tracker(&self) -> &DeletionTracker {
        &self.tracker
    }

    pub fn detector(&self) -> &DeltaDetector {
        &self.detector
    }

    pub fn repo_path(&self) -> &str {
        self.dolt.repo_path()
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Stage and commit pending changes, then align the vector store with
    /// the new commit's diff.
    ///
    /// With no pending changes this reports a `no_changes` outcome -- a
    /// no-op, not an error. Pending deletions for the current branch move
    /// pending -> staged -> committed and are cleaned up afterwards.
    pub async fn commit(&self, message: &str) -> SyncOutcome {
        let Ok(_guard) = self.op_guard.try_lock() else {
            return busy_outcome(self.dolt.repo_path());
        };
        let outcome = match self.commit_inner(message).await {
            Ok(outcome) => outcome,
            Err(e) => failure_outcome("commit", &e),
        };
        self.audit("commit", &outcome);
        outcome
    }

    async fn commit_inner(&self, message: &str) -> Result<SyncOutcome, SyncError> {
        let repo = self.dolt.repo_path();

        if !self.dolt.has_uncommitted_changes().await? {
            debug!(repo, "commit requested with no pending changes");
            return Ok(SyncOutcome::no_changes("nothing to commit"));
        }

        let branch = self.dolt.current_branch().await?;
        let parent = self.dolt.head_commit().await?;

        use crate::models::DeletionStatus::{Committed, Pending, Staged};
        self.tracker
            .transition_branch(repo, &branch, Pending, Staged)?;

        self.dolt.stage_all().await?;
        let new_head = self.dolt.commit(message).await?;

        self.tracker
            .transition_branch(repo, &branch, Staged, Committed)?;
        self.tracker.cleanup_committed_deletions(repo)?;

        let scan = self.detector.diff_all_collections(Some(&parent), &new_head).await?;
        let counts = count_rows(&scan.rows);
        let failed = self.apply_rows_to_vector_store(&scan, &new_head).await;

        self.tracker
            .db()
            .set_state(&format!("last_synced_commit:{repo}"), &new_head)?;

        info!(
            repo,
            branch = %branch,
            commit = %new_head,
            added = counts.added,
            modified = counts.modified,
            deleted = counts.deleted,
            "commit synced"
        );

        Ok(finish_outcome(
            format!("committed {} change(s)", counts.total()),
            counts,
            failed,
        )
        .with_commit(new_head)
        .with_branch(branch))
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    /// Push the current branch, distinguishing already-up-to-date,
    /// new-branch, and normal-push outcomes. Remote rejection and
    /// authentication failure carry distinct codes so callers can react
    /// differently (pull-then-retry only makes sense for a rejection).
    pub async fn push(&self, remote: &str) -> SyncOutcome {
        let outcome = match self.push_inner(remote).await {
            Ok(outcome) => outcome,
            Err(e) => failure_outcome("push", &e),
        };
        self.audit("push", &outcome);
        outcome
    }

    async fn push_inner(&self, remote: &str) -> Result<SyncOutcome, SyncError> {
        let remotes = self.dolt.list_remotes().await?;
        if remotes.is_empty() {
            return Ok(SyncOutcome::failed(
                "remote_not_found",
                "no remote is configured for this repository",
            ));
        }
        if !remotes.iter().any(|r| r == remote) {
            return Ok(SyncOutcome::failed(
                "remote_not_found",
                format!("remote '{remote}' is not configured (known: {})", remotes.join(", ")),
            ));
        }

        let branch = self.dolt.current_branch().await?;
        match self.dolt.push(remote, &branch).await {
            Ok(push) => {
                let outcome = match push.kind {
                    PushKind::UpToDate => SyncOutcome {
                        status: crate::models::SyncOpStatus::UpToDate,
                        message: format!("remote '{remote}' is already up to date"),
                        error_code: None,
                        commit_hash: None,
                        branch: Some(branch),
                        counts: ChangeCounts::default(),
                        failed_collections: Vec::new(),
                    },
                    PushKind::NewBranch => SyncOutcome::completed(format!(
                        "pushed new branch to remote '{remote}'"
                    ))
                    .with_branch(branch),
                    PushKind::Pushed => {
                        SyncOutcome::completed(format!("pushed to remote '{remote}'"))
                            .with_branch(branch)
                    }
                };
                Ok(outcome)
            }
            Err(DoltError::PushRejected { branch, detail }) => Ok(SyncOutcome::failed(
                "remote_rejected",
                format!(
                    "push of '{branch}' was rejected ({detail}); pull the remote changes and retry"
                ),
            )),
            Err(DoltError::AuthenticationFailed(detail)) => Ok(SyncOutcome::failed(
                "authentication_failed",
                format!("authentication with the remote failed: {detail}"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Merge `source_branch` into the current branch and reconcile the
    /// vector store.
    ///
    /// On conflicts the outcome carries the analyzer's findings (after an
    /// auto-resolution pass when enabled). On success two passes run: the
    /// delta between the pre- and post-merge commits, then the
    /// deletion-ledger reconciliation, which is authoritative for deletions
    /// a two-commit diff can under-report in multi-way merges. The two
    /// passes converge to the same state regardless of order.
    pub async fn merge(&self, source_branch: &str) -> MergeOutcome {
        let Ok(_guard) = self.op_guard.try_lock() else {
            return MergeOutcome {
                outcome: busy_outcome(self.dolt.repo_path()),
                conflicts: Vec::new(),
                auto_resolved: 0,
            };
        };
        let result = match self.merge_inner(source_branch).await {
            Ok(result) => result,
            Err(e) => MergeOutcome {
                outcome: failure_outcome("merge", &e),
                conflicts: Vec::new(),
                auto_resolved: 0,
            },
        };
        self.audit("merge", &result.outcome);
        result
    }

    async fn merge_inner(&self, source_branch: &str) -> Result<MergeOutcome, SyncError> {
        let repo = self.dolt.repo_path();
        let branch = self.dolt.current_branch().await?;
        let pre_merge = self.dolt.head_commit().await?;

        info!(repo, source = source_branch, target = %branch, "starting merge");
        let report = self.dolt.merge(source_branch).await?;

        let mut auto_resolved = 0;
        if !report.is_clean() {
            let mut conflicts = self.collect_conflicts().await?;

            if self.auto_resolve {
                auto_resolved = self.resolver.auto_resolve(&conflicts).await;
                if auto_resolved > 0 {
                    conflicts = self.collect_conflicts().await?;
                }
            }

            if !conflicts.is_empty() {
                let outcome = SyncOutcome {
                    status: crate::models::SyncOpStatus::Conflicts,
                    message: format!(
                        "merge of '{source_branch}' stopped on {} unresolved conflict(s)",
                        conflicts.len()
                    ),
                    error_code: Some("merge_conflicts".into()),
                    commit_hash: None,
                    branch: Some(branch),
                    counts: ChangeCounts::default(),
                    failed_collections: Vec::new(),
                };
                return Ok(MergeOutcome {
                    outcome,
                    conflicts,
                    auto_resolved,
                });
            }

            // Every conflict auto-resolved: complete the merge commit.
            self.dolt.stage_all().await?;
            self.dolt
                .commit(&format!("Merge branch '{source_branch}'"))
                .await?;
        }

        let post_merge = self.dolt.head_commit().await?;
        let scan = self
            .detector
            .diff_all_collections(Some(&pre_merge), &post_merge)
            .await?;
        let counts = count_rows(&scan.rows);
        let failed = self.apply_rows_to_vector_store(&scan, &post_merge).await;

        // The ledger knows about deletions the two-commit diff may miss.
        self.reconcile_pending_deletions(&branch, &post_merge).await?;

        self.tracker
            .db()
            .set_state(&format!("last_synced_commit:{repo}"), &post_merge)?;

        info!(
            repo,
            source = source_branch,
            commit = %post_merge,
            fast_forward = report.fast_forward,
            "merge synced"
        );

        let outcome = finish_outcome(
            if report.fast_forward {
                format!("fast-forwarded to '{source_branch}'")
            } else {
                format!("merged '{source_branch}'")
            },
            counts,
            failed,
        )
        .with_commit(post_merge)
        .with_branch(branch);

        Ok(MergeOutcome {
            outcome,
            conflicts: Vec::new(),
            auto_resolved,
        })
    }

    /// Gather analyzed conflicts from every table the working set reports
    /// as conflicted.
    async fn collect_conflicts(&self) -> Result<Vec<DetailedConflictInfo>, SyncError> {
        let tables = self.dolt.query("SELECT `table` FROM dolt_conflicts").await?;
        let mut conflicts = Vec::new();
        for row in &tables {
            if let Some(table) = row_string(row, "table") {
                conflicts.extend(self.analyzer.detailed_conflicts(&table).await?);
            }
        }
        Ok(conflicts)
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    /// Hard-reset the working set to `target`, clear the branch's pending
    /// deletion records, and re-align the vector store with the target
    /// commit.
    ///
    /// Clearing the ledger is mandatory: a reset must never leave a dangling
    /// deletion record that later fires against a document the reset
    /// restored.
    pub async fn reset(&self, target: &str) -> SyncOutcome {
        let Ok(_guard) = self.op_guard.try_lock() else {
            return busy_outcome(self.dolt.repo_path());
        };
        let outcome = match self.reset_inner(target).await {
            Ok(outcome) => outcome,
            Err(e) => failure_outcome("reset", &e),
        };
        self.audit("reset", &outcome);
        outcome
    }

    async fn reset_inner(&self, target: &str) -> Result<SyncOutcome, SyncError> {
        let repo = self.dolt.repo_path();
        let branch = self.dolt.current_branch().await?;
        let pre_reset = self.dolt.head_commit().await?;

        self.dolt.reset_hard(target).await?;
        let post_reset = self.dolt.head_commit().await?;

        let discarded = self
            .tracker
            .discard_pending_deletions_for_branch(repo, &branch)?;
        if discarded > 0 {
            info!(repo, branch = %branch, discarded, "cleared pending deletions on reset");
        }

        let (counts, failed) = if pre_reset != post_reset {
            let scan = self
                .detector
                .diff_all_collections(Some(&pre_reset), &post_reset)
                .await?;
            let counts = count_rows(&scan.rows);
            let failed = self.apply_rows_to_vector_store(&scan, &post_reset).await;
            (counts, failed)
        } else {
            (ChangeCounts::default(), Vec::new())
        };

        Ok(finish_outcome(
            format!("reset to {target}"),
            counts,
            failed,
        )
        .with_commit(post_reset)
        .with_branch(branch))
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Current repository and ledger state.
    pub async fn status(&self) -> Result<StatusReport, SyncError> {
        let repo = self.dolt.repo_path().to_string();
        let branch = self.dolt.current_branch().await?;
        let head_commit = self.dolt.head_commit().await?;
        let collections = self.detector.available_collections().await?;
        let pending = self.tracker.get_pending_deletions(&repo, None)?;
        let last_synced = self
            .tracker
            .db()
            .get_state(&format!("last_synced_commit:{repo}"))?;

        Ok(StatusReport {
            repo_path: repo,
            branch,
            head_commit,
            collections,
            pending_deletions: pending.len(),
            last_synced_commit: last_synced,
        })
    }

    // -----------------------------------------------------------------------
    // Vector-store application
    // -----------------------------------------------------------------------

    /// Apply a delta scan to the vector store.
    ///
    /// Collections are processed serially so a delete and an add of the same
    /// document id are never applied out of order. Per-collection failures
    /// are collected (and returned) without aborting the remaining
    /// collections.
    async fn apply_rows_to_vector_store(&self, scan: &DeltaScan, at_commit: &str) -> Vec<String> {
        let mut failed: Vec<String> = scan.failed_collections.clone();

        let mut by_collection: BTreeMap<&str, Vec<&DiffRow>> = BTreeMap::new();
        for row in &scan.rows {
            by_collection.entry(&row.collection).or_default().push(row);
        }

        for (collection, rows) in by_collection {
            if let Err(e) = self.apply_collection(collection, &rows, at_commit).await {
                warn!(collection, error = %e, "vector-store sync failed for collection");
                if !failed.iter().any(|c| c == collection) {
                    failed.push(collection.to_string());
                }
            }
        }
        failed
    }

    async fn apply_collection(
        &self,
        collection: &str,
        rows: &[&DiffRow],
        at_commit: &str,
    ) -> Result<(), SyncError> {
        let upsert_ids: Vec<String> = rows
            .iter()
            .filter(|r| r.diff_type != DiffType::Removed)
            .map(|r| r.doc_id.clone())
            .collect();
        let contents = if upsert_ids.is_empty() {
            BTreeMap::new()
        } else {
            self.fetch_documents(collection, &upsert_ids, at_commit).await?
        };

        for row in rows {
            match row.diff_type {
                DiffType::Removed => {
                    self.delete_logical(collection, &row.doc_id).await?;
                }
                DiffType::Added | DiffType::Modified => {
                    // Replace any existing physical chunks, then add fresh.
                    // Deleting first keeps add-after-delete ordering correct
                    // for re-added documents.
                    self.delete_logical(collection, &row.doc_id).await?;
                    if let Some(record) = contents.get(&row.doc_id) {
                        self.chroma
                            .add_documents(collection, std::slice::from_ref(record), false)
                            .await
                            .map_err(SyncError::ChromaError)?;
                    } else {
                        warn!(
                            collection,
                            doc_id = %row.doc_id,
                            "changed document missing at commit; skipping"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove every physical entry belonging to a logical document id.
    /// A document stored without a chunk suffix is matched by its bare id.
    async fn delete_logical(&self, collection: &str, doc_id: &str) -> Result<(), ChromaError> {
        let logical = [doc_id.to_string()];
        let ids = chunk::expand_physical_ids(
            self.chroma.as_ref(),
            collection,
            &logical,
            &self.chunk_separator,
        )
        .await?;
        if !ids.is_empty() {
            self.chroma.delete_documents(collection, &ids).await?;
        }
        Ok(())
    }

    async fn fetch_documents(
        &self,
        collection: &str,
        doc_ids: &[String],
        at_commit: &str,
    ) -> Result<BTreeMap<String, VectorRecord>, DoltError> {
        let id_list = doc_ids
            .iter()
            .map(|id| sql_quote(id))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = self
            .dolt
            .query(&format!(
                "SELECT doc_id, title, content, metadata FROM documents AS OF {} \
                 WHERE collection_name = {} AND doc_id IN ({})",
                sql_quote(at_commit),
                sql_quote(collection),
                id_list
            ))
            .await?;

        let mut records = BTreeMap::new();
        for row in &rows {
            let Some(doc_id) = row_string(row, "doc_id") else {
                continue;
            };
            let content = row_string(row, "content").unwrap_or_default();

            let mut metadata = serde_json::Map::new();
            if let Some(title) = row_string(row, "title") {
                metadata.insert("title".into(), JsonValue::String(title));
            }
            match row.get("metadata") {
                Some(JsonValue::Object(extra)) => {
                    metadata.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Some(JsonValue::String(s)) => {
                    if let Ok(JsonValue::Object(extra)) = serde_json::from_str(s) {
                        metadata.extend(extra);
                    }
                }
                _ => {}
            }

            records.insert(
                doc_id.clone(),
                VectorRecord::new(doc_id, content).with_metadata(metadata),
            );
        }
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Deletion reconciliation
    // -----------------------------------------------------------------------

    /// Treat the ledger's pending deletions as authoritative: any tracked
    /// document absent from the versioned store at `at_commit` is removed
    /// from the vector store; any tracked document the merge restored has
    /// its record discarded. Idempotent -- running twice converges on the
    /// same state.
    async fn reconcile_pending_deletions(
        &self,
        branch: &str,
        at_commit: &str,
    ) -> Result<usize, SyncError> {
        let repo = self.dolt.repo_path();
        let pending = self.tracker.get_pending_deletions(repo, None)?;
        let mut applied = 0;

        for record in pending.iter().filter(|r| r.branch_context == branch) {
            let rows = self
                .dolt
                .query(&format!(
                    "SELECT doc_id FROM documents AS OF {} \
                     WHERE collection_name = {} AND doc_id = {}",
                    sql_quote(at_commit),
                    sql_quote(&record.collection),
                    sql_quote(&record.doc_id)
                ))
                .await?;

            if rows.is_empty() {
                self.delete_logical(&record.collection, &record.doc_id)
                    .await
                    .map_err(SyncError::ChromaError)?;
                self.tracker.mark_deletion_committed(record.id)?;
                applied += 1;
                debug!(
                    doc_id = %record.doc_id,
                    collection = %record.collection,
                    "reconciliation applied tracked deletion"
                );
            } else {
                // The merge restored the document; the pending deletion must
                // not fire.
                self.tracker.discard_deletion(record.id)?;
                debug!(
                    doc_id = %record.doc_id,
                    collection = %record.collection,
                    "document restored; discarded tracked deletion"
                );
            }
        }

        self.tracker.cleanup_committed_deletions(repo)?;
        Ok(applied)
    }

    fn audit(&self, action: &str, outcome: &SyncOutcome) {
        let _ = self.tracker.db().insert_audit_entry(
            action,
            Some(self.dolt.repo_path()),
            outcome.branch.as_deref(),
            outcome.commit_hash.as_deref(),
            Some(&outcome.message),
            outcome.is_success(),
        );
    }
}

// ---------------------------------------------------------------------------
// Outcome helpers
// ---------------------------------------------------------------------------

fn count_rows(rows: &[DiffRow]) -> ChangeCounts {
    let mut counts = ChangeCounts::default();
    for row in rows {
        match row.diff_type {
            DiffType::Added => counts.added += 1,
            DiffType::Modified => counts.modified += 1,
            DiffType::Removed => counts.deleted += 1,
        }
    }
    counts
}

fn finish_outcome(message: String, counts: ChangeCounts, failed: Vec<String>) -> SyncOutcome {
    if failed.is_empty() {
        SyncOutcome::completed(message).with_counts(counts)
    } else {
        SyncOutcome {
            status: crate::models::SyncOpStatus::PartialFailure,
            message: format!("{message}; {} collection(s) failed to sync", failed.len()),
            error_code: Some("partial_failure".into()),
            commit_hash: None,
            branch: None,
            counts,
            failed_collections: failed,
        }
    }
}

fn busy_outcome(repo: &str) -> SyncOutcome {
    SyncOutcome::failed(
        "operation_in_progress",
        format!("another sync operation is already running for '{repo}'"),
    )
}

/// Map an internal error to a failure outcome with a stable code and enough
/// context for the caller to decide on retry or escalation.
fn failure_outcome(operation: &str, error: &SyncError) -> SyncOutcome {
    let code = match error {
        SyncError::AlreadyRunning { .. } => "operation_in_progress",
        SyncError::DoltError(dolt) => match dolt {
            DoltError::BranchNotFound(_) => "branch_not_found",
            DoltError::CommitNotFound(_) => "commit_not_found",
            DoltError::RemoteNotFound(_) => "remote_not_found",
            DoltError::PushRejected { .. } => "remote_rejected",
            DoltError::AuthenticationFailed(_) => "authentication_failed",
            DoltError::MergeConflict(_) => "merge_conflicts",
            DoltError::BinaryNotFound(_) => "dolt_unavailable",
            _ => "versioned_store_error",
        },
        SyncError::ChromaError(_) => "vector_store_error",
        SyncError::DatabaseError(db) => match db {
            DatabaseError::StorageInit { .. } => "storage_init_error",
            _ => "ledger_error",
        },
        SyncError::ConflictError(conflict) => match conflict {
            ConflictError::NoRowsUpdated { .. } => "resolution_no_rows",
            ConflictError::NotFound(_) => "conflict_not_found",
            _ => "conflict_error",
        },
    };
    warn!(operation, code, error = %error, "sync operation failed");
    SyncOutcome::failed(code, format!("{operation} failed: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_rows() {
        let rows = vec![
            DiffRow {
                doc_id: "a".into(),
                collection: "notes".into(),
                title: String::new(),
                diff_type: DiffType::Added,
            },
            DiffRow {
                doc_id: "b".into(),
                collection: "notes".into(),
                title: String::new(),
                diff_type: DiffType::Removed,
            },
            DiffRow {
                doc_id: "c".into(),
                collection: "notes".into(),
                title: String::new(),
                diff_type: DiffType::Modified,
            },
        ];
        let counts = count_rows(&rows);
        assert_eq!(counts.added, 1);
        assert_eq!(counts.modified, 1);
        assert_eq!(counts.deleted, 1);
    }

    #[test]
    fn test_failure_outcome_codes() {
        let err = SyncError::DoltError(DoltError::AuthenticationFailed("denied".into()));
        let outcome = failure_outcome("push", &err);
        assert_eq!(outcome.error_code.as_deref(), Some("authentication_failed"));

        let err = SyncError::DoltError(DoltError::PushRejected {
            branch: "main".into(),
            detail: "stale".into(),
        });
        let outcome = failure_outcome("push", &err);
        assert_eq!(outcome.error_code.as_deref(), Some("remote_rejected"));

        let err = SyncError::ConflictError(ConflictError::NoRowsUpdated {
            table: "documents".into(),
            doc_id: "d".into(),
        });
        let outcome = failure_outcome("merge", &err);
        assert_eq!(outcome.error_code.as_deref(), Some("resolution_no_rows"));
    }

    #[test]
    fn test_partial_failure_outcome() {
        let outcome = finish_outcome(
            "merged 'feature'".into(),
            ChangeCounts {
                added: 2,
                modified: 0,
                deleted: 1,
            },
            vec!["articles".into()],
        );
        assert_eq!(
            outcome.status,
            crate::models::SyncOpStatus::PartialFailure
        );
        assert_eq!(outcome.failed_collections, vec!["articles"]);
        assert_eq!(outcome.counts.total(), 3);
    }
}
