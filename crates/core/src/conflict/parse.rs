//! Tolerant translation of raw conflict payloads.
//!
//! The versioned store's conflict output is loosely shaped: per-table
//! conflict rows carry `base_` / `our_` / `their_` column prefixes, preview
//! payloads may nest whole objects, and field names drift between snake and
//! camel case. All of that guessing is isolated here; everything downstream
//! works against [`DetailedConflictInfo`].

use serde_json::Value as JsonValue;

use super::{
    conflict_id, ConflictType, DetailedConflictInfo, FieldConflict, FieldValues, ResolutionType,
};
use crate::errors::ConflictError;
use crate::store::SqlRow;

/// Keys that may carry the document id.
const DOC_ID_KEYS: &[&str] = &["doc_id", "docId", "document_id", "documentId", "id"];

/// Keys that may carry an explicit conflict-type tag.
const TYPE_KEYS: &[&str] = &["conflict_type", "conflictType", "type"];

/// Alternate spellings for the three sides.
const BASE_KEYS: &[&str] = &["base", "base_values", "baseValues"];
const OURS_KEYS: &[&str] = &["ours", "our", "our_values", "ourValues"];
const THEIRS_KEYS: &[&str] = &["theirs", "their", "their_values", "theirValues"];

/// A conflict row reduced to its three-way field maps, before
/// classification.
#[derive(Debug, Clone)]
pub struct RawConflict {
    pub document_id: String,
    pub explicit_type: Option<ConflictType>,
    pub base_values: FieldValues,
    pub our_values: FieldValues,
    pub their_values: FieldValues,
}

/// Translate one raw conflict row into its three-way shape.
///
/// Accepts either nested side objects (`{"ours": {...}, "theirs": {...}}`)
/// or the flat prefixed form produced by per-table conflict queries
/// (`our_content`, `their_content`, `base_content`, ...).
pub fn parse_conflict_row(row: &SqlRow) -> Result<RawConflict, ConflictError> {
    let base_values = nested_side(row, BASE_KEYS).unwrap_or_else(|| prefixed_side(row, "base"));
    let our_values = nested_side(row, OURS_KEYS).unwrap_or_else(|| prefixed_side(row, "our"));
    let their_values =
        nested_side(row, THEIRS_KEYS).unwrap_or_else(|| prefixed_side(row, "their"));

    let document_id = find_doc_id(&our_values)
        .or_else(|| find_doc_id(&their_values))
        .or_else(|| find_doc_id(&base_values))
        .or_else(|| {
            DOC_ID_KEYS
                .iter()
                .find_map(|key| row.get(*key).and_then(value_as_string))
        })
        .ok_or_else(|| {
            ConflictError::ParseError(format!(
                "conflict row has no recognizable document id: {}",
                JsonValue::Object(row.clone())
            ))
        })?;

    let explicit_type = TYPE_KEYS
        .iter()
        .find_map(|key| row.get(*key))
        .and_then(|v| v.as_str())
        .and_then(ConflictType::from_tag);

    Ok(RawConflict {
        document_id,
        explicit_type,
        base_values,
        our_values,
        their_values,
    })
}

/// Classify a raw conflict from structural cues.
///
/// An explicit type tag wins. Otherwise: no base and both sides present is
/// an add/add; exactly one side missing is a delete/modify; equal content
/// with diverging remaining fields is a metadata conflict; everything else
/// defaults to a content modification.
pub fn classify(raw: &RawConflict) -> ConflictType {
    if let Some(explicit) = raw.explicit_type {
        return explicit;
    }

    let base_empty = side_is_absent(&raw.base_values);
    let ours_empty = side_is_absent(&raw.our_values);
    let theirs_empty = side_is_absent(&raw.their_values);

    if ours_empty != theirs_empty {
        return ConflictType::DeleteModify;
    }
    if base_empty && !ours_empty && !theirs_empty {
        return ConflictType::AddAdd;
    }

    let our_content = raw.our_values.get("content");
    let their_content = raw.their_values.get("content");
    if our_content.is_some() && our_content == their_content {
        let metadata_diverged = raw
            .our_values
            .iter()
            .any(|(k, v)| k != "content" && raw.their_values.get(k) != Some(v));
        if metadata_diverged {
            return ConflictType::MetadataConflict;
        }
    }

    ConflictType::ContentModification
}

/// Build the fixed analyzed shape from one raw conflict row.
///
/// `detailed` controls whether per-field diffs are computed.
pub fn to_detailed(
    collection: &str,
    raw: RawConflict,
    detailed: bool,
) -> DetailedConflictInfo {
    let conflict_type = classify(&raw);
    let auto_resolvable = is_auto_resolvable(&raw, conflict_type);

    let field_conflicts = if detailed {
        field_conflicts(&raw)
    } else {
        Vec::new()
    };

    let suggested_resolution = match conflict_type {
        ConflictType::AddAdd if auto_resolvable => ResolutionType::KeepOurs,
        _ if auto_resolvable => ResolutionType::AutoResolve,
        ConflictType::DeleteModify => ResolutionType::KeepOurs,
        _ => ResolutionType::KeepOurs,
    };

    let mut resolution_options = vec![
        ResolutionType::KeepOurs,
        ResolutionType::KeepTheirs,
        ResolutionType::FieldMerge,
        ResolutionType::Custom,
    ];
    if auto_resolvable {
        resolution_options.push(ResolutionType::AutoResolve);
    }

    DetailedConflictInfo {
        conflict_id: conflict_id(collection, &raw.document_id, conflict_type),
        collection: collection.to_string(),
        document_id: raw.document_id,
        conflict_type,
        base_values: raw.base_values,
        our_values: raw.our_values,
        their_values: raw.their_values,
        auto_resolvable,
        suggested_resolution,
        resolution_options,
        field_conflicts,
    }
}

/// The auto-resolvability rules:
///
/// - content modification: the field sets changed from base by each side
///   must be disjoint;
/// - add/add: the `content` field must be byte-identical on both sides;
/// - metadata: always (resolved by newer-timestamp precedence later);
/// - delete/modify and schema: never.
pub fn is_auto_resolvable(raw: &RawConflict, conflict_type: ConflictType) -> bool {
    match conflict_type {
        ConflictType::ContentModification => {
            let our_changed = changed_fields(&raw.base_values, &raw.our_values);
            let their_changed = changed_fields(&raw.base_values, &raw.their_values);
            our_changed.iter().all(|f| !their_changed.contains(f))
        }
        ConflictType::AddAdd => raw.our_values.get("content") == raw.their_values.get("content"),
        ConflictType::MetadataConflict => true,
        ConflictType::DeleteModify | ConflictType::SchemaConflict => false,
    }
}

/// Fields whose value differs between two sides (union of keys, id fields
/// excluded).
pub fn changed_fields(from: &FieldValues, to: &FieldValues) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for key in from.keys().chain(to.keys()) {
        if is_doc_id_key(key) || fields.iter().any(|f| f == key) {
            continue;
        }
        if from.get(key) != to.get(key) {
            fields.push(key.clone());
        }
    }
    fields
}

fn field_conflicts(raw: &RawConflict) -> Vec<FieldConflict> {
    let mut conflicts = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    for key in raw.our_values.keys().chain(raw.their_values.keys()) {
        if is_doc_id_key(key) || seen.contains(&key.as_str()) {
            continue;
        }
        seen.push(key.as_str());
        let ours = raw.our_values.get(key).cloned().unwrap_or(JsonValue::Null);
        let theirs = raw.their_values.get(key).cloned().unwrap_or(JsonValue::Null);
        if ours != theirs {
            let base = raw.base_values.get(key).cloned().unwrap_or(JsonValue::Null);
            conflicts.push(FieldConflict::new(key.clone(), base, ours, theirs));
        }
    }
    conflicts
}

fn is_doc_id_key(key: &str) -> bool {
    DOC_ID_KEYS.contains(&key)
}

fn nested_side(row: &SqlRow, keys: &[&str]) -> Option<FieldValues> {
    keys.iter().find_map(|key| {
        row.get(*key)
            .and_then(JsonValue::as_object)
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    })
}

/// Collect `<prefix>_column` keys into a side map, accepting both the
/// singular and plural prefix spellings (`our_` / `ours_`).
fn prefixed_side(row: &SqlRow, prefix: &str) -> FieldValues {
    let singular = format!("{prefix}_");
    let plural = format!("{prefix}s_");
    let mut values = FieldValues::new();
    for (key, value) in row {
        let stripped = key
            .strip_prefix(&singular)
            .or_else(|| key.strip_prefix(&plural));
        if let Some(field) = stripped {
            if !field.is_empty() {
                values.insert(field.to_string(), value.clone());
            }
        }
    }
    values
}

/// A side is "absent" when it has no values, or only null values -- a
/// deleted row in a conflict table shows up as all-null columns.
fn side_is_absent(values: &FieldValues) -> bool {
    values.is_empty() || values.values().all(JsonValue::is_null)
}

fn find_doc_id(values: &FieldValues) -> Option<String> {
    DOC_ID_KEYS
        .iter()
        .find_map(|key| values.get(*key).and_then(value_as_string))
}

fn value_as_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> SqlRow {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_flat_prefixed_row() {
        let raw = parse_conflict_row(&row(json!({
            "base_doc_id": "doc-1",
            "base_content": "old",
            "our_doc_id": "doc-1",
            "our_content": "ours",
            "their_doc_id": "doc-1",
            "their_content": "theirs",
        })))
        .unwrap();

        assert_eq!(raw.document_id, "doc-1");
        assert_eq!(raw.base_values.get("content"), Some(&json!("old")));
        assert_eq!(raw.our_values.get("content"), Some(&json!("ours")));
        assert_eq!(raw.their_values.get("content"), Some(&json!("theirs")));
    }

    #[test]
    fn test_parse_nested_row_with_camel_case() {
        let raw = parse_conflict_row(&row(json!({
            "documentId": "doc-2",
            "conflictType": "AddAdd",
            "baseValues": {},
            "ourValues": {"content": "same"},
            "theirValues": {"content": "same"},
        })))
        .unwrap();

        assert_eq!(raw.document_id, "doc-2");
        assert_eq!(raw.explicit_type, Some(ConflictType::AddAdd));
        assert!(raw.base_values.is_empty());
    }

    #[test]
    fn test_parse_row_without_doc_id_fails() {
        let result = parse_conflict_row(&row(json!({"our_content": "x"})));
        assert!(matches!(result, Err(ConflictError::ParseError(_))));
    }

    #[test]
    fn test_classify_structural_cues() {
        // Add/add: no base, both sides present.
        let raw = parse_conflict_row(&row(json!({
            "our_doc_id": "d", "our_content": "a",
            "their_doc_id": "d", "their_content": "b",
        })))
        .unwrap();
        assert_eq!(classify(&raw), ConflictType::AddAdd);

        // Delete/modify: one side all-null.
        let raw = parse_conflict_row(&row(json!({
            "base_doc_id": "d", "base_content": "x",
            "our_doc_id": null, "our_content": null,
            "their_doc_id": "d", "their_content": "y",
        })))
        .unwrap();
        assert_eq!(classify(&raw), ConflictType::DeleteModify);

        // Metadata: content identical, another field diverged.
        let raw = parse_conflict_row(&row(json!({
            "base_doc_id": "d", "base_content": "x", "base_tags": "old",
            "our_doc_id": "d", "our_content": "x", "our_tags": "a",
            "their_doc_id": "d", "their_content": "x", "their_tags": "b",
        })))
        .unwrap();
        assert_eq!(classify(&raw), ConflictType::MetadataConflict);

        // Default: content modification.
        let raw = parse_conflict_row(&row(json!({
            "base_doc_id": "d", "base_content": "x",
            "our_doc_id": "d", "our_content": "y",
            "their_doc_id": "d", "their_content": "z",
        })))
        .unwrap();
        assert_eq!(classify(&raw), ConflictType::ContentModification);
    }

    #[test]
    fn test_auto_resolvable_disjoint_fields() {
        // Ours changed `title`, theirs changed `tags`: disjoint.
        let raw = parse_conflict_row(&row(json!({
            "base_doc_id": "d", "base_title": "t0", "base_tags": "g0", "base_content": "c",
            "our_doc_id": "d", "our_title": "t1", "our_tags": "g0", "our_content": "c",
            "their_doc_id": "d", "their_title": "t0", "their_tags": "g1", "their_content": "c",
        })))
        .unwrap();
        assert!(is_auto_resolvable(&raw, ConflictType::ContentModification));

        // Both changed `title` differently: not disjoint.
        let raw = parse_conflict_row(&row(json!({
            "base_doc_id": "d", "base_title": "t0",
            "our_doc_id": "d", "our_title": "t1",
            "their_doc_id": "d", "their_title": "t2",
        })))
        .unwrap();
        assert!(!is_auto_resolvable(&raw, ConflictType::ContentModification));
    }

    #[test]
    fn test_auto_resolvable_add_add_content_identity() {
        let identical = parse_conflict_row(&row(json!({
            "our_doc_id": "d", "our_content": "same",
            "their_doc_id": "d", "their_content": "same",
        })))
        .unwrap();
        assert!(is_auto_resolvable(&identical, ConflictType::AddAdd));

        let differing = parse_conflict_row(&row(json!({
            "our_doc_id": "d", "our_content": "a",
            "their_doc_id": "d", "their_content": "b",
        })))
        .unwrap();
        assert!(!is_auto_resolvable(&differing, ConflictType::AddAdd));
    }

    #[test]
    fn test_never_auto_resolvable_types() {
        let raw = parse_conflict_row(&row(json!({
            "base_doc_id": "d", "base_content": "x",
            "our_doc_id": "d", "our_content": "y",
            "their_doc_id": "d", "their_content": "z",
        })))
        .unwrap();
        assert!(!is_auto_resolvable(&raw, ConflictType::DeleteModify));
        assert!(!is_auto_resolvable(&raw, ConflictType::SchemaConflict));
        // Metadata conflicts are unconditionally auto-resolvable.
        assert!(is_auto_resolvable(&raw, ConflictType::MetadataConflict));
    }

    #[test]
    fn test_to_detailed_stable_id_and_fields() {
        let build = || {
            to_detailed(
                "notes",
                parse_conflict_row(&row(json!({
                    "base_doc_id": "d", "base_title": "t0", "base_content": "c0",
                    "our_doc_id": "d", "our_title": "t1", "our_content": "c0",
                    "their_doc_id": "d", "their_title": "t0", "their_content": "c2",
                })))
                .unwrap(),
                true,
            )
        };
        let first = build();
        let second = build();
        assert_eq!(first.conflict_id, second.conflict_id);
        assert_eq!(first.conflict_type, ConflictType::ContentModification);
        // title and content differ between the sides.
        assert_eq!(first.field_conflicts.len(), 2);
        // Disjoint changes: ours touched title, theirs touched content.
        assert!(first.auto_resolvable);
        assert!(first
            .resolution_options
            .contains(&ResolutionType::AutoResolve));
    }
}
