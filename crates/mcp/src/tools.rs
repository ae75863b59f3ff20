//! Tool registry: schemas and dispatch into the sync core.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use doltvec_core::conflict::{DetailedConflictInfo, ResolutionType};
use doltvec_core::conflict::resolver::ResolutionRequest;
use doltvec_core::store::ResolveSide;
use doltvec_core::sync::SyncManager;

/// Shared state handed to every tool invocation.
pub struct ToolContext {
    pub manager: Arc<SyncManager>,
    pub default_remote: String,
}

/// Static definition of one MCP tool.
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: JsonValue,
}

fn schema(properties: JsonValue, required: &[&str]) -> JsonValue {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// All tools exposed by the server.
pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "sync_commit",
            description: "Stage and commit pending changes, then sync the vector store with the new commit's diff.",
            input_schema: schema(
                json!({ "message": { "type": "string", "description": "Commit message" } }),
                &["message"],
            ),
        },
        ToolDef {
            name: "sync_push",
            description: "Push the current branch to a remote. Distinguishes up-to-date, new-branch, rejected, and authentication failures.",
            input_schema: schema(
                json!({ "remote": { "type": "string", "description": "Remote name (defaults to the configured remote)" } }),
                &[],
            ),
        },
        ToolDef {
            name: "sync_merge",
            description: "Merge a branch into the current branch and reconcile the vector store. Returns conflict details when the merge is not clean.",
            input_schema: schema(
                json!({ "source_branch": { "type": "string", "description": "Branch to merge into the current branch" } }),
                &["source_branch"],
            ),
        },
        ToolDef {
            name: "sync_reset",
            description: "Hard-reset to a target commit, clearing pending deletion records for the current branch and re-aligning the vector store.",
            input_schema: schema(
                json!({ "target": { "type": "string", "description": "Target ref or commit hash" } }),
                &["target"],
            ),
        },
        ToolDef {
            name: "sync_status",
            description: "Current repository, collection, and deletion-ledger state.",
            input_schema: schema(json!({}), &[]),
        },
        ToolDef {
            name: "analyze_merge_conflicts",
            description: "Preview the conflicts a merge would produce, with auto-resolvability analysis and a change-count preview.",
            input_schema: schema(
                json!({
                    "source_branch": { "type": "string" },
                    "target_branch": { "type": "string" },
                    "include_auto_resolvable": { "type": "boolean", "default": true },
                    "detailed_diff": { "type": "boolean", "default": true }
                }),
                &["source_branch", "target_branch"],
            ),
        },
        ToolDef {
            name: "get_detailed_conflicts",
            description: "Analyzed conflicts for one table of the in-progress merge.",
            input_schema: schema(
                json!({ "table": { "type": "string", "description": "Conflicted table (collection) name" } }),
                &["table"],
            ),
        },
        ToolDef {
            name: "preview_conflict_resolution",
            description: "Dry-run a resolution strategy against one conflict: resulting document, data-loss warnings, confidence.",
            input_schema: schema(
                json!({
                    "table": { "type": "string" },
                    "conflict_id": { "type": "string" },
                    "resolution_type": { "type": "string", "enum": ["keep_ours", "keep_theirs", "field_merge", "custom", "auto_resolve"] }
                }),
                &["table", "conflict_id", "resolution_type"],
            ),
        },
        ToolDef {
            name: "resolve_conflict",
            description: "Apply a resolution strategy to one conflict and clear its marker.",
            input_schema: schema(
                json!({
                    "table": { "type": "string" },
                    "conflict_id": { "type": "string" },
                    "resolution_type": { "type": "string", "enum": ["keep_ours", "keep_theirs", "field_merge", "custom", "auto_resolve"] },
                    "field_resolutions": { "type": "object", "description": "Field name to 'ours'/'theirs', for field_merge" },
                    "custom_values": { "type": "object", "description": "Field name to value, for custom" }
                }),
                &["table", "conflict_id", "resolution_type"],
            ),
        },
        ToolDef {
            name: "auto_resolve_conflicts",
            description: "Resolve every auto-resolvable conflict in a table; returns the count resolved.",
            input_schema: schema(
                json!({ "table": { "type": "string" } }),
                &["table"],
            ),
        },
        ToolDef {
            name: "compare_document_versions",
            description: "Three-way comparison of one document between two branches and their merge base.",
            input_schema: schema(
                json!({
                    "table": { "type": "string" },
                    "doc_id": { "type": "string" },
                    "source_branch": { "type": "string" },
                    "target_branch": { "type": "string" }
                }),
                &["table", "doc_id", "source_branch", "target_branch"],
            ),
        },
        ToolDef {
            name: "list_pending_deletions",
            description: "Deletion-ledger records not yet propagated to the vector store.",
            input_schema: schema(
                json!({ "collection": { "type": "string", "description": "Optional collection filter" } }),
                &[],
            ),
        },
        ToolDef {
            name: "discard_pending_deletion",
            description: "Remove one tracked deletion by record id so it will never be applied.",
            input_schema: schema(
                json!({ "record_id": { "type": "integer" } }),
                &["record_id"],
            ),
        },
    ]
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run one tool. `Err` carries a human-readable message that becomes an
/// `isError` tool result.
pub async fn dispatch(
    ctx: &ToolContext,
    name: &str,
    args: &JsonValue,
) -> Result<JsonValue, String> {
    match name {
        "sync_commit" => {
            let message = require_str(args, "message")?;
            let outcome = ctx.manager.commit(&message).await;
            to_json(&outcome)
        }
        "sync_push" => {
            let remote = optional_str(args, "remote").unwrap_or_else(|| ctx.default_remote.clone());
            let outcome = ctx.manager.push(&remote).await;
            to_json(&outcome)
        }
        "sync_merge" => {
            let source = require_str(args, "source_branch")?;
            let outcome = ctx.manager.merge(&source).await;
            to_json(&outcome)
        }
        "sync_reset" => {
            let target = require_str(args, "target")?;
            let outcome = ctx.manager.reset(&target).await;
            to_json(&outcome)
        }
        "sync_status" => {
            let status = ctx.manager.status().await.map_err(|e| e.to_string())?;
            to_json(&status)
        }
        "analyze_merge_conflicts" => {
            let source = require_str(args, "source_branch")?;
            let target = require_str(args, "target_branch")?;
            let include_auto = optional_bool(args, "include_auto_resolvable").unwrap_or(true);
            let detailed = optional_bool(args, "detailed_diff").unwrap_or(true);
            let preview = ctx
                .manager
                .analyzer()
                .analyze_merge(&source, &target, include_auto, detailed)
                .await
                .map_err(|e| e.to_string())?;
            to_json(&preview)
        }
        "get_detailed_conflicts" => {
            let table = require_str(args, "table")?;
            let conflicts = ctx
                .manager
                .analyzer()
                .detailed_conflicts(&table)
                .await
                .map_err(|e| e.to_string())?;
            to_json(&conflicts)
        }
        "preview_conflict_resolution" => {
            let table = require_str(args, "table")?;
            let conflict = find_conflict(ctx, &table, &require_str(args, "conflict_id")?).await?;
            let resolution_type = parse_resolution_type(args)?;
            let preview = ctx
                .manager
                .analyzer()
                .resolution_preview(&conflict, resolution_type);
            to_json(&preview)
        }
        "resolve_conflict" => {
            let table = require_str(args, "table")?;
            let conflict = find_conflict(ctx, &table, &require_str(args, "conflict_id")?).await?;
            let resolution_type = parse_resolution_type(args)?;
            let request = ResolutionRequest {
                field_resolutions: parse_field_resolutions(args)?,
                custom_values: parse_custom_values(args),
            };
            ctx.manager
                .resolver()
                .resolve(&conflict, resolution_type, &request)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "resolved": true, "conflict_id": conflict.conflict_id }))
        }
        "auto_resolve_conflicts" => {
            let table = require_str(args, "table")?;
            let conflicts = ctx
                .manager
                .analyzer()
                .detailed_conflicts(&table)
                .await
                .map_err(|e| e.to_string())?;
            let resolved = ctx.manager.resolver().auto_resolve(&conflicts).await;
            Ok(json!({ "resolved": resolved, "total": conflicts.len() }))
        }
        "compare_document_versions" => {
            let table = require_str(args, "table")?;
            let doc_id = require_str(args, "doc_id")?;
            let source = require_str(args, "source_branch")?;
            let target = require_str(args, "target_branch")?;
            let comparison = ctx
                .manager
                .analyzer()
                .content_comparison(&table, &doc_id, &source, &target)
                .await
                .map_err(|e| e.to_string())?;
            to_json(&comparison)
        }
        "list_pending_deletions" => {
            let collection = optional_str(args, "collection");
            let pending = ctx
                .manager
                .tracker()
                .get_pending_deletions(ctx.manager.repo_path(), collection.as_deref())
                .map_err(|e| e.to_string())?;
            to_json(&pending)
        }
        "discard_pending_deletion" => {
            let record_id = args
                .get("record_id")
                .and_then(JsonValue::as_i64)
                .ok_or_else(|| "missing integer argument 'record_id'".to_string())?;
            let removed = ctx
                .manager
                .tracker()
                .discard_deletion(record_id)
                .map_err(|e| e.to_string())?;
            Ok(json!({ "removed": removed, "record_id": record_id }))
        }
        other => Err(format!("unknown tool: {other}")),
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn require_str(args: &JsonValue, key: &str) -> Result<String, String> {
    optional_str(args, key).ok_or_else(|| format!("missing string argument '{key}'"))
}

fn optional_str(args: &JsonValue, key: &str) -> Option<String> {
    args.get(key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn optional_bool(args: &JsonValue, key: &str) -> Option<bool> {
    args.get(key).and_then(JsonValue::as_bool)
}

fn parse_resolution_type(args: &JsonValue) -> Result<ResolutionType, String> {
    let raw = args
        .get("resolution_type")
        .cloned()
        .ok_or_else(|| "missing argument 'resolution_type'".to_string())?;
    serde_json::from_value(raw).map_err(|e| format!("invalid resolution_type: {e}"))
}

fn parse_field_resolutions(args: &JsonValue) -> Result<BTreeMap<String, ResolveSide>, String> {
    match args.get("field_resolutions") {
        None | Some(JsonValue::Null) => Ok(BTreeMap::new()),
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|e| format!("invalid field_resolutions: {e}"))
        }
    }
}

fn parse_custom_values(args: &JsonValue) -> BTreeMap<String, JsonValue> {
    args.get("custom_values")
        .and_then(JsonValue::as_object)
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

async fn find_conflict(
    ctx: &ToolContext,
    table: &str,
    conflict_id: &str,
) -> Result<DetailedConflictInfo, String> {
    let conflicts = ctx
        .manager
        .analyzer()
        .detailed_conflicts(table)
        .await
        .map_err(|e| e.to_string())?;
    conflicts
        .into_iter()
        .find(|c| c.conflict_id == conflict_id)
        .ok_or_else(|| format!("conflict '{conflict_id}' not found in table '{table}'"))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<JsonValue, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}
