//! Merge-conflict analysis and resolution.
//!
//! [`analyzer`] classifies conflicts and computes resolution previews;
//! [`resolver`] applies resolutions and clears conflict markers; [`parse`]
//! is the single tolerant translation step from raw conflict payloads to
//! the fixed [`DetailedConflictInfo`] shape.

pub mod analyzer;
pub mod parse;
pub mod resolver;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

pub use analyzer::ConflictAnalyzer;
pub use resolver::ConflictResolver;

// ---------------------------------------------------------------------------
// Conflict types
// ---------------------------------------------------------------------------

/// Categorisation of a merge conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both sides modified the same document's content fields.
    ContentModification,
    /// Both sides added a document with the same id.
    AddAdd,
    /// One side deleted, the other modified.
    DeleteModify,
    /// Only metadata fields diverged.
    MetadataConflict,
    /// The table structure itself diverged.
    SchemaConflict,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentModification => "content_modification",
            Self::AddAdd => "add_add",
            Self::DeleteModify => "delete_modify",
            Self::MetadataConflict => "metadata_conflict",
            Self::SchemaConflict => "schema_conflict",
        }
    }

    /// Parse an explicit type tag from raw conflict data. Accepts both the
    /// snake_case form and the original camel-case spellings.
    pub fn from_tag(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "content_modification" | "contentmodification" | "content" => {
                Some(Self::ContentModification)
            }
            "add_add" | "addadd" => Some(Self::AddAdd),
            "delete_modify" | "deletemodify" | "modify_delete" | "modifydelete" => {
                Some(Self::DeleteModify)
            }
            "metadata_conflict" | "metadataconflict" | "metadata" => Some(Self::MetadataConflict),
            "schema_conflict" | "schemaconflict" | "schema" => Some(Self::SchemaConflict),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named resolution strategies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    KeepOurs,
    KeepTheirs,
    FieldMerge,
    Custom,
    AutoResolve,
}

impl std::fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepOurs => write!(f, "keep_ours"),
            Self::KeepTheirs => write!(f, "keep_theirs"),
            Self::FieldMerge => write!(f, "field_merge"),
            Self::Custom => write!(f, "custom"),
            Self::AutoResolve => write!(f, "auto_resolve"),
        }
    }
}

/// Field-name → value map for one side of a conflict.
pub type FieldValues = BTreeMap<String, JsonValue>;

// ---------------------------------------------------------------------------
// Field conflicts
// ---------------------------------------------------------------------------

/// One field that differs between "ours" and "theirs".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field_name: String,
    pub base_value: JsonValue,
    pub our_value: JsonValue,
    pub their_value: JsonValue,
    pub base_hash: String,
    pub our_hash: String,
    pub their_hash: String,
    /// True only when base≠ours, base≠theirs, and ours≠theirs all hold:
    /// both sides diverged from base independently and from each other.
    pub can_auto_merge: bool,
}

impl FieldConflict {
    pub fn new(
        field_name: impl Into<String>,
        base_value: JsonValue,
        our_value: JsonValue,
        their_value: JsonValue,
    ) -> Self {
        let can_auto_merge = base_value != our_value
            && base_value != their_value
            && our_value != their_value;
        Self {
            field_name: field_name.into(),
            base_hash: value_hash(&base_value),
            our_hash: value_hash(&our_value),
            their_hash: value_hash(&their_value),
            base_value,
            our_value,
            their_value,
            can_auto_merge,
        }
    }
}

// ---------------------------------------------------------------------------
// Detailed conflict info
// ---------------------------------------------------------------------------

/// One unresolved merge conflict in its fixed, analyzed shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedConflictInfo {
    /// Deterministic id: the same logical conflict always maps to the same
    /// id across repeated analysis calls.
    pub conflict_id: String,
    pub collection: String,
    pub document_id: String,
    pub conflict_type: ConflictType,
    pub base_values: FieldValues,
    pub our_values: FieldValues,
    pub their_values: FieldValues,
    pub auto_resolvable: bool,
    pub suggested_resolution: ResolutionType,
    pub resolution_options: Vec<ResolutionType>,
    pub field_conflicts: Vec<FieldConflict>,
}

/// Stable conflict identity: a truncated sha256 over collection, document
/// id, and conflict type.
pub fn conflict_id(collection: &str, document_id: &str, conflict_type: ConflictType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collection.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(document_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(conflict_type.as_str().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Content hash of one field value (canonical JSON text).
pub fn value_hash(value: &JsonValue) -> String {
    let canonical = match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

// ---------------------------------------------------------------------------
// Merge previews
// ---------------------------------------------------------------------------

/// Change counts between the merge base and the source branch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChangePreview {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub collections_affected: usize,
}

/// Result of analyzing a prospective merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergePreview {
    pub source_branch: String,
    pub target_branch: String,
    pub conflicts: Vec<DetailedConflictInfo>,
    /// Count before any `include_auto_resolvable` filtering.
    pub total_conflicts_detected: usize,
    /// True iff every detected conflict is auto-resolvable.
    pub can_auto_merge: bool,
    /// False when the store's native preview facility was unavailable and
    /// the analysis conservatively reported zero conflicts. Callers must
    /// not read `conflicts.is_empty()` as "clean" in that case.
    pub analysis_complete: bool,
    pub change_preview: ChangePreview,
    pub recommendation: String,
}

/// A dry-run of one resolution strategy against one conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionPreview {
    pub conflict_id: String,
    pub resolution_type: ResolutionType,
    /// What the document would look like after the resolution.
    pub resulting_document: FieldValues,
    /// Fields whose value would be silently dropped.
    pub data_loss_warnings: Vec<String>,
    /// 100 for deterministic keep-ours/keep-theirs; below 80 whenever a
    /// field-level merge had to apply a heuristic tie-break.
    pub confidence: u8,
}

/// Three-way classification of one document across a merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentComparison {
    pub document_id: String,
    pub collection: String,
    pub base_values: FieldValues,
    pub source_values: FieldValues,
    pub target_values: FieldValues,
    /// One of: `identical_changes`, `use_source_changes`,
    /// `use_target_changes`, `delete_modify_conflict`,
    /// `manual_merge_required`, `no_changes`.
    pub classification: String,
}

// ---------------------------------------------------------------------------
// Field-merge heuristics
// ---------------------------------------------------------------------------

/// Outcome of merging one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMergeOutcome {
    pub value: JsonValue,
    /// True when a heuristic tie-break was applied rather than a clean
    /// one-side-changed merge.
    pub heuristic: bool,
}

/// Deterministic, field-name-driven merge of a single field.
///
/// Clean cases (no penalty): both sides equal, or only one side diverged
/// from base. When both sides diverged, the tie-break is chosen by field
/// name: timestamp-like fields prefer the chronologically later value,
/// version-like fields the numerically higher one, `content` defaults to
/// ours, and anything else prefers whichever side is non-null (ours wins
/// the final tie).
pub fn merge_field(
    field_name: &str,
    base: &JsonValue,
    ours: &JsonValue,
    theirs: &JsonValue,
) -> FieldMergeOutcome {
    if ours == theirs {
        return FieldMergeOutcome {
            value: ours.clone(),
            heuristic: false,
        };
    }
    if theirs == base {
        return FieldMergeOutcome {
            value: ours.clone(),
            heuristic: false,
        };
    }
    if ours == base {
        return FieldMergeOutcome {
            value: theirs.clone(),
            heuristic: false,
        };
    }

    // Both sides diverged: apply the name-driven tie-break.
    let lower = field_name.to_lowercase();
    let value = if lower.contains("timestamp") || lower.contains("updated") || lower.contains("modified")
    {
        later_value(ours, theirs)
    } else if lower.contains("version") {
        higher_value(ours, theirs)
    } else if field_name == "content" {
        ours.clone()
    } else if ours.is_null() && !theirs.is_null() {
        theirs.clone()
    } else {
        ours.clone()
    };

    FieldMergeOutcome {
        value,
        heuristic: true,
    }
}

/// Prefer the chronologically later of two timestamp-ish values; falls back
/// to lexicographic comparison, which is correct for RFC-3339 strings.
fn later_value(ours: &JsonValue, theirs: &JsonValue) -> JsonValue {
    match (ours.as_str(), theirs.as_str()) {
        (Some(a), Some(b)) => {
            if b > a {
                theirs.clone()
            } else {
                ours.clone()
            }
        }
        _ => match (ours.as_f64(), theirs.as_f64()) {
            (Some(a), Some(b)) if b > a => theirs.clone(),
            _ => ours.clone(),
        },
    }
}

/// Prefer the numerically higher of two version-ish values.
fn higher_value(ours: &JsonValue, theirs: &JsonValue) -> JsonValue {
    let num = |v: &JsonValue| -> Option<f64> {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim_start_matches('v').parse().ok()))
    };
    match (num(ours), num(theirs)) {
        (Some(a), Some(b)) if b > a => theirs.clone(),
        _ => ours.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conflict_id_is_stable() {
        let a = conflict_id("notes", "doc-1", ConflictType::ContentModification);
        let b = conflict_id("notes", "doc-1", ConflictType::ContentModification);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_conflict_id_varies_by_inputs() {
        let base = conflict_id("notes", "doc-1", ConflictType::ContentModification);
        assert_ne!(
            base,
            conflict_id("articles", "doc-1", ConflictType::ContentModification)
        );
        assert_ne!(
            base,
            conflict_id("notes", "doc-2", ConflictType::ContentModification)
        );
        assert_ne!(base, conflict_id("notes", "doc-1", ConflictType::AddAdd));
    }

    #[test]
    fn test_conflict_type_tags() {
        assert_eq!(
            ConflictType::from_tag("ContentModification"),
            Some(ConflictType::ContentModification)
        );
        assert_eq!(
            ConflictType::from_tag("delete_modify"),
            Some(ConflictType::DeleteModify)
        );
        assert_eq!(ConflictType::from_tag("metadata"), Some(ConflictType::MetadataConflict));
        assert_eq!(ConflictType::from_tag("bogus"), None);
    }

    #[test]
    fn test_field_conflict_auto_merge_rule() {
        // Both diverged from base and from each other.
        let fc = FieldConflict::new("tags", json!("a"), json!("b"), json!("c"));
        assert!(fc.can_auto_merge);

        // Ours unchanged from base.
        let fc = FieldConflict::new("tags", json!("a"), json!("a"), json!("c"));
        assert!(!fc.can_auto_merge);

        // Both made the same change.
        let fc = FieldConflict::new("tags", json!("a"), json!("b"), json!("b"));
        assert!(!fc.can_auto_merge);
    }

    #[test]
    fn test_merge_field_clean_cases() {
        let out = merge_field("title", &json!("t0"), &json!("t1"), &json!("t0"));
        assert_eq!(out.value, json!("t1"));
        assert!(!out.heuristic);

        let out = merge_field("title", &json!("t0"), &json!("t0"), &json!("t2"));
        assert_eq!(out.value, json!("t2"));
        assert!(!out.heuristic);

        let out = merge_field("title", &json!("t0"), &json!("same"), &json!("same"));
        assert_eq!(out.value, json!("same"));
        assert!(!out.heuristic);
    }

    #[test]
    fn test_merge_field_timestamp_prefers_later() {
        let out = merge_field(
            "updated_at",
            &json!("2025-01-01T00:00:00Z"),
            &json!("2025-03-01T00:00:00Z"),
            &json!("2025-06-01T00:00:00Z"),
        );
        assert_eq!(out.value, json!("2025-06-01T00:00:00Z"));
        assert!(out.heuristic);
    }

    #[test]
    fn test_merge_field_version_prefers_higher() {
        let out = merge_field("schema_version", &json!(1), &json!(3), &json!(2));
        assert_eq!(out.value, json!(3));
        assert!(out.heuristic);

        let out = merge_field("version", &json!("v1"), &json!("v2"), &json!("v4"));
        assert_eq!(out.value, json!("v4"));
        assert!(out.heuristic);
    }

    #[test]
    fn test_merge_field_content_defaults_to_ours() {
        let out = merge_field("content", &json!("base"), &json!("ours"), &json!("theirs"));
        assert_eq!(out.value, json!("ours"));
        assert!(out.heuristic);
    }

    #[test]
    fn test_merge_field_prefers_non_null() {
        let out = merge_field("summary", &json!("b"), &JsonValue::Null, &json!("kept"));
        assert_eq!(out.value, json!("kept"));
        assert!(out.heuristic);

        let out = merge_field("summary", &json!("b"), &json!("ours"), &json!("theirs"));
        assert_eq!(out.value, json!("ours"));
        assert!(out.heuristic);
    }
}
