//! Merge-conflict analysis.
//!
//! The [`ConflictAnalyzer`] classifies conflicts between two branches,
//! determines auto-resolvability, previews resolutions without mutating
//! anything, and resolves three-way document comparisons against the merge
//! base.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::parse;
use super::{
    merge_field, ChangePreview, ContentComparison, DetailedConflictInfo, FieldValues,
    MergePreview, ResolutionPreview, ResolutionType,
};
use crate::diff::DeltaDetector;
use crate::dolt::parser::{sql_ident, sql_quote};
use crate::errors::ConflictError;
use crate::models::DiffType;
use crate::store::VersionedStore;

/// Confidence assigned to deterministic keep-ours / keep-theirs previews.
const FULL_CONFIDENCE: u8 = 100;
/// Confidence when a field-level merge applied a heuristic tie-break.
const HEURISTIC_CONFIDENCE: u8 = 75;
/// Confidence for custom resolutions, whose values arrive at apply time.
const CUSTOM_CONFIDENCE: u8 = 50;

/// Analyzes merge conflicts between branches of the versioned store.
pub struct ConflictAnalyzer {
    store: Arc<dyn VersionedStore>,
}

impl ConflictAnalyzer {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }

    /// Analyze a prospective merge of `source_branch` into `target_branch`.
    ///
    /// `include_auto_resolvable` controls whether auto-resolvable conflicts
    /// appear in the returned list (the total count always includes them);
    /// `detailed_diff` controls per-field diff computation.
    pub async fn analyze_merge(
        &self,
        source_branch: &str,
        target_branch: &str,
        include_auto_resolvable: bool,
        detailed_diff: bool,
    ) -> Result<MergePreview, ConflictError> {
        info!(source_branch, target_branch, "analyzing merge");

        let preview = self
            .store
            .preview_merge_conflicts(source_branch, target_branch)
            .await?;

        let (conflicts, analysis_complete) = match preview {
            Some(payload) => (self.extract_conflicts(&payload, detailed_diff)?, true),
            None => {
                // The store could not preview the merge. Zero conflicts is
                // the conservative report (never fabricate conflicts), but
                // the result is flagged so callers do not read it as clean.
                warn!(
                    source_branch,
                    target_branch, "merge preview unavailable; reporting zero conflicts"
                );
                (Vec::new(), false)
            }
        };

        let total_conflicts_detected = conflicts.len();
        let can_auto_merge = conflicts.iter().all(|c| c.auto_resolvable);
        let auto_count = conflicts.iter().filter(|c| c.auto_resolvable).count();

        let change_preview = self.change_preview(source_branch, target_branch).await;

        let recommendation = if !analysis_complete {
            "Conflict preview unavailable: the analysis is incomplete and zero conflicts \
             does not mean the merge is clean. Merge with caution and re-check conflicts \
             afterwards."
                .to_string()
        } else if total_conflicts_detected == 0 {
            "No conflicts detected; the merge can proceed.".to_string()
        } else if can_auto_merge {
            format!(
                "All {total_conflicts_detected} conflict(s) are auto-resolvable; \
                 run auto-resolution and complete the merge."
            )
        } else {
            format!(
                "{} of {total_conflicts_detected} conflict(s) require manual resolution; \
                 resolve them before completing the merge.",
                total_conflicts_detected - auto_count
            )
        };

        let conflicts = if include_auto_resolvable {
            conflicts
        } else {
            conflicts.into_iter().filter(|c| !c.auto_resolvable).collect()
        };

        Ok(MergePreview {
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            conflicts,
            total_conflicts_detected,
            can_auto_merge,
            analysis_complete,
            change_preview,
            recommendation,
        })
    }

    /// Convert the per-table raw conflict rows into analyzed conflicts.
    pub async fn detailed_conflicts(
        &self,
        table: &str,
    ) -> Result<Vec<DetailedConflictInfo>, ConflictError> {
        let rows = self.store.conflict_rows(table).await?;
        let mut conflicts = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw = parse::parse_conflict_row(row)?;
            conflicts.push(parse::to_detailed(table, raw, true));
        }
        debug!(table, count = conflicts.len(), "loaded detailed conflicts");
        Ok(conflicts)
    }

    /// Compute, without mutating anything, what a resolution would produce.
    pub fn resolution_preview(
        &self,
        conflict: &DetailedConflictInfo,
        resolution_type: ResolutionType,
    ) -> ResolutionPreview {
        match resolution_type {
            ResolutionType::KeepOurs => keep_side_preview(conflict, resolution_type, true),
            ResolutionType::KeepTheirs => keep_side_preview(conflict, resolution_type, false),
            ResolutionType::FieldMerge | ResolutionType::AutoResolve => {
                field_merge_preview(conflict, resolution_type)
            }
            ResolutionType::Custom => ResolutionPreview {
                conflict_id: conflict.conflict_id.clone(),
                resolution_type,
                resulting_document: conflict.our_values.clone(),
                data_loss_warnings: vec![
                    "custom resolution replaces every field with caller-supplied values"
                        .to_string(),
                ],
                confidence: CUSTOM_CONFIDENCE,
            },
        }
    }

    /// Resolve the three-way diff of one document between two branches.
    pub async fn content_comparison(
        &self,
        table: &str,
        doc_id: &str,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<ContentComparison, ConflictError> {
        let base_commit = self
            .store
            .merge_base(source_branch, target_branch)
            .await?;

        let base = self.document_at(table, doc_id, &base_commit).await?;
        let source = self.document_at(table, doc_id, source_branch).await?;
        let target = self.document_at(table, doc_id, target_branch).await?;

        let source_changed = source != base;
        let target_changed = target != base;

        let classification = if !source_changed && !target_changed {
            "no_changes"
        } else if source == target {
            "identical_changes"
        } else if source_changed && !target_changed {
            "use_source_changes"
        } else if target_changed && !source_changed {
            "use_target_changes"
        } else if source.is_none() != target.is_none() {
            "delete_modify_conflict"
        } else {
            "manual_merge_required"
        };

        debug!(table, doc_id, classification, "compared document versions");
        Ok(ContentComparison {
            document_id: doc_id.to_string(),
            collection: table.to_string(),
            base_values: base.unwrap_or_default(),
            source_values: source.unwrap_or_default(),
            target_values: target.unwrap_or_default(),
            classification: classification.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn extract_conflicts(
        &self,
        payload: &serde_json::Value,
        detailed_diff: bool,
    ) -> Result<Vec<DetailedConflictInfo>, ConflictError> {
        let tables = payload
            .get("conflict_tables")
            .or_else(|| payload.get("conflicts"))
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut conflicts = Vec::new();
        for entry in &tables {
            let table = entry
                .get("table")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("documents");
            let rows = entry
                .get("rows")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default();
            for row in &rows {
                let Some(obj) = row.as_object() else {
                    return Err(ConflictError::ParseError(format!(
                        "conflict row is not an object: {row}"
                    )));
                };
                let raw = parse::parse_conflict_row(obj)?;
                conflicts.push(parse::to_detailed(table, raw, detailed_diff));
            }
        }
        Ok(conflicts)
    }

    /// Change counts between the merge base and the source branch.
    ///
    /// Best-effort: a failure here degrades the preview, it does not fail
    /// the analysis.
    async fn change_preview(&self, source_branch: &str, target_branch: &str) -> ChangePreview {
        let base = match self.store.merge_base(source_branch, target_branch).await {
            Ok(base) => base,
            Err(e) => {
                warn!(error = %e, "merge-base lookup failed; omitting change preview");
                return ChangePreview::default();
            }
        };

        let detector = DeltaDetector::new(self.store.clone());
        match detector.diff_all_collections(Some(&base), source_branch).await {
            Ok(scan) => {
                let mut preview = ChangePreview::default();
                let mut collections: Vec<&str> = Vec::new();
                for row in &scan.rows {
                    match row.diff_type {
                        DiffType::Added => preview.added += 1,
                        DiffType::Modified => preview.modified += 1,
                        DiffType::Removed => preview.deleted += 1,
                    }
                    if !collections.contains(&row.collection.as_str()) {
                        collections.push(&row.collection);
                    }
                }
                preview.collections_affected = collections.len();
                preview
            }
            Err(e) => {
                warn!(error = %e, "change preview diff failed");
                ChangePreview::default()
            }
        }
    }

    async fn document_at(
        &self,
        table: &str,
        doc_id: &str,
        at_ref: &str,
    ) -> Result<Option<FieldValues>, ConflictError> {
        let rows = self
            .store
            .query(&format!(
                "SELECT * FROM {} AS OF {} WHERE doc_id = {}",
                sql_ident(table),
                sql_quote(at_ref),
                sql_quote(doc_id)
            ))
            .await?;
        Ok(rows
            .first()
            .map(|row| row.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
    }
}

// ---------------------------------------------------------------------------
// Preview construction
// ---------------------------------------------------------------------------

fn keep_side_preview(
    conflict: &DetailedConflictInfo,
    resolution_type: ResolutionType,
    keep_ours: bool,
) -> ResolutionPreview {
    let (kept, dropped, dropped_name) = if keep_ours {
        (&conflict.our_values, &conflict.their_values, "theirs")
    } else {
        (&conflict.their_values, &conflict.our_values, "ours")
    };

    let mut warnings = Vec::new();
    for (field, value) in dropped {
        if !value.is_null() && kept.get(field) != Some(value) {
            warnings.push(format!(
                "field '{field}' from {dropped_name} will be dropped"
            ));
        }
    }

    ResolutionPreview {
        conflict_id: conflict.conflict_id.clone(),
        resolution_type,
        resulting_document: kept.clone(),
        data_loss_warnings: warnings,
        confidence: FULL_CONFIDENCE,
    }
}

fn field_merge_preview(
    conflict: &DetailedConflictInfo,
    resolution_type: ResolutionType,
) -> ResolutionPreview {
    let mut resulting = conflict.our_values.clone();
    let mut warnings = Vec::new();
    let mut confidence = FULL_CONFIDENCE;

    for fc in &conflict.field_conflicts {
        let outcome = merge_field(&fc.field_name, &fc.base_value, &fc.our_value, &fc.their_value);
        if outcome.heuristic {
            confidence = HEURISTIC_CONFIDENCE;
            warnings.push(format!(
                "heuristic tie-break applied to field '{}'",
                fc.field_name
            ));
        }
        if outcome.value != fc.our_value && !fc.our_value.is_null() {
            warnings.push(format!(
                "field '{}' loses the value from ours",
                fc.field_name
            ));
        } else if outcome.value != fc.their_value && !fc.their_value.is_null() {
            warnings.push(format!(
                "field '{}' loses the value from theirs",
                fc.field_name
            ));
        }
        resulting.insert(fc.field_name.clone(), outcome.value);
    }

    ResolutionPreview {
        conflict_id: conflict.conflict_id.clone(),
        resolution_type,
        resulting_document: resulting,
        data_loss_warnings: warnings,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::parse::{parse_conflict_row, to_detailed};
    use serde_json::json;

    fn conflict(detail: serde_json::Value) -> DetailedConflictInfo {
        let row = detail.as_object().unwrap().clone();
        to_detailed("notes", parse_conflict_row(&row).unwrap(), true)
    }

    fn disjoint_conflict() -> DetailedConflictInfo {
        conflict(json!({
            "base_doc_id": "d", "base_title": "t0", "base_tags": "g0",
            "our_doc_id": "d", "our_title": "t1", "our_tags": "g0",
            "their_doc_id": "d", "their_title": "t0", "their_tags": "g1",
        }))
    }

    #[test]
    fn test_keep_ours_preview_is_deterministic() {
        let c = disjoint_conflict();
        let analyzer_preview = keep_side_preview(&c, ResolutionType::KeepOurs, true);
        assert_eq!(analyzer_preview.confidence, FULL_CONFIDENCE);
        assert_eq!(
            analyzer_preview.resulting_document.get("title"),
            Some(&json!("t1"))
        );
        // theirs' tags value is dropped.
        assert!(analyzer_preview
            .data_loss_warnings
            .iter()
            .any(|w| w.contains("tags")));
    }

    #[test]
    fn test_field_merge_preview_disjoint_is_clean() {
        let c = disjoint_conflict();
        let preview = field_merge_preview(&c, ResolutionType::AutoResolve);
        // Each side's change is taken; no heuristic needed.
        assert_eq!(preview.confidence, FULL_CONFIDENCE);
        assert_eq!(preview.resulting_document.get("title"), Some(&json!("t1")));
        assert_eq!(preview.resulting_document.get("tags"), Some(&json!("g1")));
    }

    #[test]
    fn test_field_merge_preview_heuristic_lowers_confidence() {
        let c = conflict(json!({
            "base_doc_id": "d", "base_content": "c0",
            "our_doc_id": "d", "our_content": "c1",
            "their_doc_id": "d", "their_content": "c2",
        }));
        let preview = field_merge_preview(&c, ResolutionType::FieldMerge);
        assert!(preview.confidence < 80);
        assert_eq!(preview.resulting_document.get("content"), Some(&json!("c1")));
        assert!(preview
            .data_loss_warnings
            .iter()
            .any(|w| w.contains("heuristic")));
    }
}
