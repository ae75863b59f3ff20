//! Parsing helpers for `dolt` CLI output.
//!
//! Queries run with `-r json` produce `{"rows": [...]}`; procedure calls
//! (`CALL DOLT_MERGE(...)`) come back as ordinary result rows. Push and
//! other porcelain commands are classified from their text output.

use serde_json::Value as JsonValue;

use crate::errors::DoltError;
use crate::store::{PushKind, SqlRow};

/// Parse the JSON document produced by `dolt sql -r json`.
///
/// An empty output (mutating statements print nothing) parses as zero rows.
pub fn parse_json_rows(output: &str) -> Result<Vec<SqlRow>, DoltError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: JsonValue = serde_json::from_str(trimmed)
        .map_err(|e| DoltError::OutputParseError(format!("invalid JSON: {e}")))?;

    let rows = value
        .get("rows")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| DoltError::OutputParseError("missing 'rows' array".into()))?;

    rows.iter()
        .map(|row| {
            row.as_object().cloned().ok_or_else(|| {
                DoltError::OutputParseError(format!("row is not an object: {row}"))
            })
        })
        .collect()
}

/// Extract a string column, accepting numeric values as their decimal form.
pub fn row_string(row: &SqlRow, key: &str) -> Option<String> {
    match row.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Extract an integer column, accepting string-encoded integers.
pub fn row_i64(row: &SqlRow, key: &str) -> Option<i64> {
    match row.get(key)? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Classify the text output of a successful `dolt push`.
pub fn classify_push_output(output: &str) -> PushKind {
    let lower = output.to_lowercase();
    if lower.contains("everything up-to-date") || lower.contains("everything up to date") {
        PushKind::UpToDate
    } else if lower.contains("new branch") {
        PushKind::NewBranch
    } else {
        PushKind::Pushed
    }
}

/// Map the stderr of a failed `dolt push` to a precise error.
pub fn classify_push_failure(branch: &str, exit_code: i32, stderr: &str) -> DoltError {
    let lower = stderr.to_lowercase();
    if lower.contains("authentication")
        || lower.contains("credential")
        || lower.contains("permission denied")
        || lower.contains("unauthorized")
    {
        DoltError::AuthenticationFailed(stderr.trim().to_string())
    } else if lower.contains("rejected") || lower.contains("non-fast-forward") {
        DoltError::PushRejected {
            branch: branch.to_string(),
            detail: stderr.trim().to_string(),
        }
    } else if lower.contains("remote not found") || lower.contains("unknown remote") {
        DoltError::RemoteNotFound(stderr.trim().to_string())
    } else {
        DoltError::CommandFailed {
            exit_code,
            stderr: stderr.to_string(),
        }
    }
}

/// Escape a string for embedding in a single-quoted SQL literal.
pub fn sql_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote an identifier (table or column name) with backticks.
pub fn sql_ident(s: &str) -> String {
    format!("`{}`", s.replace('`', ""))
}

/// Render a JSON value as a SQL literal.
pub fn sql_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(true) => "TRUE".to_string(),
        JsonValue::Bool(false) => "FALSE".to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => sql_quote(s),
        other => sql_quote(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_rows() {
        let output = r#"{"rows": [{"name": "main", "hash": "abc123"}, {"name": "feature", "hash": "def456"}]}"#;
        let rows = parse_json_rows(output).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(row_string(&rows[0], "name").as_deref(), Some("main"));
        assert_eq!(row_string(&rows[1], "hash").as_deref(), Some("def456"));
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_json_rows("").unwrap().is_empty());
        assert!(parse_json_rows("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_json_rows("not json"),
            Err(DoltError::OutputParseError(_))
        ));
        assert!(matches!(
            parse_json_rows(r#"{"no_rows": true}"#),
            Err(DoltError::OutputParseError(_))
        ));
    }

    #[test]
    fn test_row_accessors_coerce() {
        let rows = parse_json_rows(r#"{"rows": [{"n": 42, "s": "7", "b": true}]}"#).unwrap();
        assert_eq!(row_i64(&rows[0], "n"), Some(42));
        assert_eq!(row_i64(&rows[0], "s"), Some(7));
        assert_eq!(row_string(&rows[0], "n").as_deref(), Some("42"));
        assert_eq!(row_string(&rows[0], "b").as_deref(), Some("true"));
        assert_eq!(row_i64(&rows[0], "missing"), None);
    }

    #[test]
    fn test_classify_push_output() {
        assert_eq!(
            classify_push_output("Everything up-to-date"),
            PushKind::UpToDate
        );
        assert_eq!(
            classify_push_output(" * [new branch]  feature -> feature"),
            PushKind::NewBranch
        );
        assert_eq!(classify_push_output("abc..def  main -> main"), PushKind::Pushed);
    }

    #[test]
    fn test_classify_push_failure() {
        let err = classify_push_failure("main", 1, "hint: Updates were rejected");
        assert!(matches!(err, DoltError::PushRejected { .. }));

        let err = classify_push_failure("main", 1, "fatal: authentication failed for remote");
        assert!(matches!(err, DoltError::AuthenticationFailed(_)));

        let err = classify_push_failure("main", 1, "something unexpected");
        assert!(matches!(err, DoltError::CommandFailed { .. }));
    }

    #[test]
    fn test_sql_quote() {
        assert_eq!(sql_quote("plain"), "'plain'");
        assert_eq!(sql_quote("o'brien"), "'o''brien'");
        assert_eq!(sql_ident("documents"), "`documents`");
    }

    #[test]
    fn test_sql_value() {
        use serde_json::json;
        assert_eq!(sql_value(&JsonValue::Null), "NULL");
        assert_eq!(sql_value(&json!(true)), "TRUE");
        assert_eq!(sql_value(&json!(42)), "42");
        assert_eq!(sql_value(&json!("it's")), "'it''s'");
        assert_eq!(sql_value(&json!(["a"])), "'[\"a\"]'");
    }
}
