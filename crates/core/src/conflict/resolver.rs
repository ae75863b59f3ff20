//! Conflict resolution actions.
//!
//! The [`ConflictResolver`] applies a chosen strategy to one conflict and
//! clears its marker. Keep-ours / keep-theirs delegate to the versioned
//! store's native per-table primitive; field merges and custom resolutions
//! write resolved values directly, where an update affecting zero rows is a
//! failure -- it means the conflict table and the orchestration logic have
//! drifted apart.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{merge_field, ConflictType, DetailedConflictInfo, FieldValues, ResolutionType};
use crate::dolt::parser::{sql_ident, sql_quote, sql_value};
use crate::errors::ConflictError;
use crate::store::{ResolveSide, VersionedStore};

/// A request to resolve one conflict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionRequest {
    /// Per-field side choices, used by [`ResolutionType::FieldMerge`].
    #[serde(default)]
    pub field_resolutions: BTreeMap<String, ResolveSide>,
    /// Caller-supplied values, used by [`ResolutionType::Custom`].
    #[serde(default)]
    pub custom_values: FieldValues,
}

/// Applies resolutions and clears conflict markers.
pub struct ConflictResolver {
    store: Arc<dyn VersionedStore>,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }

    /// Apply `resolution_type` to one conflict. On success the underlying
    /// conflict marker is removed, so the conflict cannot reappear in
    /// subsequent queries.
    pub async fn resolve(
        &self,
        conflict: &DetailedConflictInfo,
        resolution_type: ResolutionType,
        request: &ResolutionRequest,
    ) -> Result<(), ConflictError> {
        info!(
            conflict_id = %conflict.conflict_id,
            collection = %conflict.collection,
            document_id = %conflict.document_id,
            resolution = %resolution_type,
            "resolving conflict"
        );

        match resolution_type {
            ResolutionType::KeepOurs => {
                self.store
                    .resolve_conflicts(&conflict.collection, ResolveSide::Ours)
                    .await?;
            }
            ResolutionType::KeepTheirs => {
                self.store
                    .resolve_conflicts(&conflict.collection, ResolveSide::Theirs)
                    .await?;
            }
            ResolutionType::FieldMerge => {
                self.apply_field_merge(
                    &conflict.collection,
                    &conflict.document_id,
                    &request.field_resolutions,
                )
                .await?;
            }
            ResolutionType::Custom => {
                self.apply_custom_resolution(
                    &conflict.collection,
                    &conflict.document_id,
                    &request.custom_values,
                )
                .await?;
            }
            ResolutionType::AutoResolve => {
                self.auto_resolve_one(conflict).await?;
            }
        }

        debug!(conflict_id = %conflict.conflict_id, "conflict resolved");
        Ok(())
    }

    /// Apply auto-resolution to every conflict already flagged
    /// auto-resolvable. Conflicts not flagged are never attempted, and an
    /// individual failure does not abort the batch. Returns the count
    /// actually resolved.
    pub async fn auto_resolve(&self, conflicts: &[DetailedConflictInfo]) -> usize {
        let mut resolved = 0;
        for conflict in conflicts {
            if !conflict.auto_resolvable {
                continue;
            }
            match self.auto_resolve_one(conflict).await {
                Ok(()) => resolved += 1,
                Err(e) => {
                    warn!(
                        conflict_id = %conflict.conflict_id,
                        error = %e,
                        "auto-resolution failed; continuing with remaining conflicts"
                    );
                }
            }
        }
        info!(resolved, total = conflicts.len(), "auto-resolution pass complete");
        resolved
    }

    /// For each field, copy the chosen side's staged value into the resolved
    /// row, then delete the conflict marker. An update affecting zero rows
    /// is a failure, not a silent no-op.
    pub async fn apply_field_merge(
        &self,
        table: &str,
        doc_id: &str,
        field_resolutions: &BTreeMap<String, ResolveSide>,
    ) -> Result<(), ConflictError> {
        if field_resolutions.is_empty() {
            return Err(ConflictError::InvalidResolution {
                id: doc_id.to_string(),
                detail: "field merge requires at least one field resolution".into(),
            });
        }

        let conflict_table = format!("dolt_conflicts_{table}");
        let assignments: Vec<String> = field_resolutions
            .iter()
            .map(|(field, side)| {
                let prefix = match side {
                    ResolveSide::Ours => "our",
                    ResolveSide::Theirs => "their",
                };
                format!(
                    "t.{} = c.{}",
                    sql_ident(field),
                    sql_ident(&format!("{prefix}_{field}"))
                )
            })
            .collect();

        let update = format!(
            "UPDATE {table} t JOIN {conflict_table} c ON c.our_doc_id = t.doc_id \
             SET {assignments} WHERE t.doc_id = {doc}",
            table = sql_ident(table),
            conflict_table = sql_ident(&conflict_table),
            assignments = assignments.join(", "),
            doc = sql_quote(doc_id)
        );

        let affected = self.store.execute(&update).await?;
        if affected == 0 {
            return Err(ConflictError::NoRowsUpdated {
                table: table.to_string(),
                doc_id: doc_id.to_string(),
            });
        }

        self.delete_marker(table, doc_id).await?;
        debug!(table, doc_id, fields = field_resolutions.len(), "field merge applied");
        Ok(())
    }

    /// Write caller-supplied values directly, same zero-row-update rule.
    pub async fn apply_custom_resolution(
        &self,
        table: &str,
        doc_id: &str,
        custom_values: &FieldValues,
    ) -> Result<(), ConflictError> {
        if custom_values.is_empty() {
            return Err(ConflictError::InvalidResolution {
                id: doc_id.to_string(),
                detail: "custom resolution requires at least one value".into(),
            });
        }

        let assignments: Vec<String> = custom_values
            .iter()
            .map(|(field, value)| format!("{} = {}", sql_ident(field), sql_value(value)))
            .collect();

        let update = format!(
            "UPDATE {table} SET {assignments} WHERE doc_id = {doc}",
            table = sql_ident(table),
            assignments = assignments.join(", "),
            doc = sql_quote(doc_id)
        );

        let affected = self.store.execute(&update).await?;
        if affected == 0 {
            return Err(ConflictError::NoRowsUpdated {
                table: table.to_string(),
                doc_id: doc_id.to_string(),
            });
        }

        self.delete_marker(table, doc_id).await?;
        debug!(table, doc_id, fields = custom_values.len(), "custom resolution applied");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn auto_resolve_one(&self, conflict: &DetailedConflictInfo) -> Result<(), ConflictError> {
        if !conflict.auto_resolvable {
            return Err(ConflictError::InvalidResolution {
                id: conflict.conflict_id.clone(),
                detail: format!(
                    "{} conflict is not auto-resolvable",
                    conflict.conflict_type
                ),
            });
        }

        match conflict.conflict_type {
            // Identical adds: either side is the correct result.
            ConflictType::AddAdd => {
                self.store
                    .resolve_conflicts(&conflict.collection, ResolveSide::Ours)
                    .await?;
                Ok(())
            }
            ConflictType::ContentModification | ConflictType::MetadataConflict => {
                let mut merged = FieldValues::new();
                for fc in &conflict.field_conflicts {
                    let outcome =
                        merge_field(&fc.field_name, &fc.base_value, &fc.our_value, &fc.their_value);
                    merged.insert(fc.field_name.clone(), outcome.value);
                }
                if merged.is_empty() {
                    // Nothing actually diverged; keeping ours clears the marker.
                    self.store
                        .resolve_conflicts(&conflict.collection, ResolveSide::Ours)
                        .await?;
                    return Ok(());
                }
                self.apply_custom_resolution(&conflict.collection, &conflict.document_id, &merged)
                    .await
            }
            ConflictType::DeleteModify | ConflictType::SchemaConflict => {
                Err(ConflictError::InvalidResolution {
                    id: conflict.conflict_id.clone(),
                    detail: "conflict type cannot be auto-resolved".into(),
                })
            }
        }
    }

    /// Remove the conflict marker for one document. A zero-row delete means
    /// the marker was already gone -- the same drift condition as a
    /// zero-row update.
    async fn delete_marker(&self, table: &str, doc_id: &str) -> Result<(), ConflictError> {
        let conflict_table = format!("dolt_conflicts_{table}");
        let delete = format!(
            "DELETE FROM {table} WHERE our_doc_id = {doc} OR their_doc_id = {doc} \
             OR base_doc_id = {doc}",
            table = sql_ident(&conflict_table),
            doc = sql_quote(doc_id)
        );
        let affected = self.store.execute(&delete).await?;
        if affected == 0 {
            return Err(ConflictError::NotFound(doc_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::parse::{parse_conflict_row, to_detailed};
    use crate::errors::DoltError;
    use crate::models::CommitInfo;
    use crate::store::{MergeReport, PushOutcome, SqlRow, VersionedStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Fake store that records executed SQL and returns canned affected-row
    /// counts: statements matching `fail_pattern` report zero rows.
    #[derive(Default)]
    struct RecordingStore {
        executed: Mutex<Vec<String>>,
        resolved: Mutex<Vec<(String, ResolveSide)>>,
        zero_rows: bool,
    }

    #[async_trait]
    impl VersionedStore for RecordingStore {
        fn repo_path(&self) -> &str {
            "/fake"
        }
        async fn head_commit(&self) -> Result<String, DoltError> {
            Ok("head".into())
        }
        async fn current_branch(&self) -> Result<String, DoltError> {
            Ok("main".into())
        }
        async fn list_branches(&self) -> Result<Vec<String>, DoltError> {
            Ok(vec!["main".into()])
        }
        async fn list_remotes(&self) -> Result<Vec<String>, DoltError> {
            Ok(vec![])
        }
        async fn log(&self, _limit: usize) -> Result<Vec<CommitInfo>, DoltError> {
            Ok(vec![])
        }
        async fn checkout(&self, _ref_name: &str, _create_new: bool) -> Result<(), DoltError> {
            Ok(())
        }
        async fn stage_all(&self) -> Result<(), DoltError> {
            Ok(())
        }
        async fn has_uncommitted_changes(&self) -> Result<bool, DoltError> {
            Ok(false)
        }
        async fn commit(&self, _message: &str) -> Result<String, DoltError> {
            Ok("head".into())
        }
        async fn push(&self, _remote: &str, _branch: &str) -> Result<PushOutcome, DoltError> {
            unreachable!("push not used in resolver tests")
        }
        async fn merge(&self, _source_branch: &str) -> Result<MergeReport, DoltError> {
            unreachable!("merge not used in resolver tests")
        }
        async fn abort_merge(&self) -> Result<(), DoltError> {
            Ok(())
        }
        async fn reset_hard(&self, _target: &str) -> Result<(), DoltError> {
            Ok(())
        }
        async fn merge_base(&self, _a: &str, _b: &str) -> Result<String, DoltError> {
            Ok("base".into())
        }
        async fn query(&self, _sql: &str) -> Result<Vec<SqlRow>, DoltError> {
            Ok(vec![])
        }
        async fn execute(&self, sql: &str) -> Result<u64, DoltError> {
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(if self.zero_rows { 0 } else { 1 })
        }
        async fn preview_merge_conflicts(
            &self,
            _source_branch: &str,
            _target_branch: &str,
        ) -> Result<Option<serde_json::Value>, DoltError> {
            Ok(None)
        }
        async fn conflict_rows(&self, _table: &str) -> Result<Vec<SqlRow>, DoltError> {
            Ok(vec![])
        }
        async fn resolve_conflicts(
            &self,
            table: &str,
            side: ResolveSide,
        ) -> Result<(), DoltError> {
            self.resolved.lock().unwrap().push((table.to_string(), side));
            Ok(())
        }
    }

    fn conflict(detail: serde_json::Value) -> DetailedConflictInfo {
        let row = detail.as_object().unwrap().clone();
        to_detailed("documents", parse_conflict_row(&row).unwrap(), true)
    }

    fn resolver(zero_rows: bool) -> (ConflictResolver, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore {
            zero_rows,
            ..Default::default()
        });
        (ConflictResolver::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_keep_ours_delegates_to_store() {
        let (resolver, store) = resolver(false);
        let c = conflict(json!({
            "base_doc_id": "d", "base_content": "x",
            "our_doc_id": "d", "our_content": "y",
            "their_doc_id": "d", "their_content": "z",
        }));

        resolver
            .resolve(&c, ResolutionType::KeepOurs, &ResolutionRequest::default())
            .await
            .unwrap();

        let resolved = store.resolved.lock().unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0], ("documents".to_string(), ResolveSide::Ours));
    }

    #[tokio::test]
    async fn test_field_merge_zero_rows_is_failure() {
        let (resolver, _store) = resolver(true);
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), ResolveSide::Theirs);

        let err = resolver
            .apply_field_merge("documents", "missing-doc", &fields)
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::NoRowsUpdated { .. }));
    }

    #[tokio::test]
    async fn test_field_merge_updates_then_clears_marker() {
        let (resolver, store) = resolver(false);
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), ResolveSide::Theirs);
        fields.insert("tags".to_string(), ResolveSide::Ours);

        resolver
            .apply_field_merge("documents", "doc-1", &fields)
            .await
            .unwrap();

        let executed = store.executed.lock().unwrap();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].contains("c.`their_title`"));
        assert!(executed[0].contains("c.`our_tags`"));
        assert!(executed[1].starts_with("DELETE FROM `dolt_conflicts_documents`"));
    }

    #[tokio::test]
    async fn test_custom_resolution_empty_values_rejected() {
        let (resolver, _store) = resolver(false);
        let err = resolver
            .apply_custom_resolution("documents", "doc-1", &FieldValues::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::InvalidResolution { .. }));
    }

    #[tokio::test]
    async fn test_auto_resolve_skips_unflagged() {
        let (resolver, store) = resolver(false);

        // Both changed the same field: not auto-resolvable.
        let manual = conflict(json!({
            "base_doc_id": "d1", "base_title": "t0",
            "our_doc_id": "d1", "our_title": "t1",
            "their_doc_id": "d1", "their_title": "t2",
        }));
        // Identical add/add: auto-resolvable.
        let auto = conflict(json!({
            "our_doc_id": "d2", "our_content": "same",
            "their_doc_id": "d2", "their_content": "same",
        }));

        let resolved = resolver.auto_resolve(&[manual, auto]).await;
        assert_eq!(resolved, 1);
        // Only the add/add went through the native primitive.
        assert_eq!(store.resolved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_resolve_merges_disjoint_content_changes() {
        let (resolver, store) = resolver(false);
        let c = conflict(json!({
            "base_doc_id": "d", "base_title": "t0", "base_tags": "g0", "base_content": "c",
            "our_doc_id": "d", "our_title": "t1", "our_tags": "g0", "our_content": "c",
            "their_doc_id": "d", "their_title": "t0", "their_tags": "g1", "their_content": "c",
        }));
        assert!(c.auto_resolvable);

        resolver
            .resolve(&c, ResolutionType::AutoResolve, &ResolutionRequest::default())
            .await
            .unwrap();

        let executed = store.executed.lock().unwrap();
        // Merged update takes ours' title and theirs' tags.
        assert!(executed[0].contains("`tags` = 'g1'"));
        assert!(executed[0].contains("`title` = 't1'"));
    }

    #[tokio::test]
    async fn test_auto_resolve_rejects_delete_modify() {
        let (resolver, _store) = resolver(false);
        let c = conflict(json!({
            "base_doc_id": "d", "base_content": "x",
            "our_doc_id": null, "our_content": null,
            "their_doc_id": "d", "their_content": "y",
        }));
        assert_eq!(c.conflict_type, ConflictType::DeleteModify);

        let err = resolver
            .resolve(&c, ResolutionType::AutoResolve, &ResolutionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::InvalidResolution { .. }));
    }
}
