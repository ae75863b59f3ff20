//! Asynchronous Dolt CLI client.
//!
//! Wraps the `dolt` binary running against a local repository directory.
//! Structural queries go through `dolt sql -r json` (the system tables
//! `dolt_log`, `dolt_branches`, `dolt_remotes`, `dolt_status`,
//! `dolt_conflicts`); workflow commands (checkout, push) use the porcelain
//! CLI because they have no SQL equivalent.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::parser::{
    classify_push_failure, classify_push_output, parse_json_rows, row_i64, row_string, sql_quote,
};
use crate::errors::DoltError;
use crate::models::CommitInfo;
use crate::store::{MergeReport, PushOutcome, ResolveSide, SqlRow, VersionedStore};

/// Asynchronous client for a Dolt repository via the CLI.
#[derive(Debug, Clone)]
pub struct DoltCli {
    binary: String,
    repo_path: PathBuf,
    repo_path_str: String,
}

impl DoltCli {
    /// Create a new client for the repository at `repo_path`.
    pub fn new(binary: impl Into<String>, repo_path: impl Into<PathBuf>) -> Self {
        let repo_path = repo_path.into();
        let client = Self {
            binary: binary.into(),
            repo_path_str: repo_path.display().to_string(),
            repo_path,
        };
        info!(repo = %client.repo_path_str, "created DoltCli");
        client
    }

    /// Initialize a new Dolt repository in the working directory.
    #[instrument(skip(self), fields(repo = %self.repo_path_str))]
    pub async fn init(&self) -> Result<(), DoltError> {
        self.run_dolt(&["init"]).await?;
        info!("dolt init completed");
        Ok(())
    }

    /// Clone a remote repository into the working directory.
    #[instrument(skip(self), fields(repo = %self.repo_path_str))]
    pub async fn clone_repository(&self, url: &str, branch: Option<&str>) -> Result<(), DoltError> {
        let mut args = vec!["clone", url, "."];
        if let Some(b) = branch {
            args.extend_from_slice(&["--branch", b]);
        }
        self.run_dolt(&args).await?;
        info!(url, "dolt clone completed");
        Ok(())
    }

    async fn sql(&self, query: &str) -> Result<Vec<SqlRow>, DoltError> {
        let output = self.run_dolt(&["sql", "-q", query, "-r", "json"]).await?;
        parse_json_rows(&output)
    }

    async fn sql_scalar_string(&self, query: &str, column: &str) -> Result<String, DoltError> {
        let rows = self.sql(query).await?;
        rows.first()
            .and_then(|row| row_string(row, column))
            .ok_or_else(|| {
                DoltError::OutputParseError(format!("query returned no '{column}': {query}"))
            })
    }

    async fn run_dolt(&self, args: &[&str]) -> Result<String, DoltError> {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&self.repo_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(cmd = ?format!("dolt {}", args.join(" ")), "running dolt command");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DoltError::BinaryNotFound(self.binary.clone())
            } else {
                DoltError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "dolt command failed");
            return Err(DoltError::CommandFailed { exit_code, stderr });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Delete a local branch (used to clean up preview branches).
    async fn delete_branch(&self, name: &str) -> Result<(), DoltError> {
        self.run_dolt(&["branch", "-D", name]).await?;
        Ok(())
    }
}

#[async_trait]
impl VersionedStore for DoltCli {
    fn repo_path(&self) -> &str {
        &self.repo_path_str
    }

    async fn head_commit(&self) -> Result<String, DoltError> {
        self.sql_scalar_string("SELECT dolt_hashof('HEAD') AS hash", "hash")
            .await
    }

    async fn current_branch(&self) -> Result<String, DoltError> {
        self.sql_scalar_string("SELECT active_branch() AS branch", "branch")
            .await
    }

    async fn list_branches(&self) -> Result<Vec<String>, DoltError> {
        let rows = self.sql("SELECT name FROM dolt_branches ORDER BY name").await?;
        Ok(rows
            .iter()
            .filter_map(|row| row_string(row, "name"))
            .collect())
    }

    async fn list_remotes(&self) -> Result<Vec<String>, DoltError> {
        let rows = self.sql("SELECT name FROM dolt_remotes ORDER BY name").await?;
        Ok(rows
            .iter()
            .filter_map(|row| row_string(row, "name"))
            .collect())
    }

    async fn log(&self, limit: usize) -> Result<Vec<CommitInfo>, DoltError> {
        let rows = self
            .sql(&format!(
                "SELECT commit_hash, committer, message, date FROM dolt_log LIMIT {limit}"
            ))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(CommitInfo {
                    hash: row_string(row, "commit_hash")?,
                    committer: row_string(row, "committer").unwrap_or_default(),
                    message: row_string(row, "message").unwrap_or_default(),
                    timestamp: row_string(row, "date"),
                })
            })
            .collect())
    }

    #[instrument(skip(self), fields(repo = %self.repo_path_str))]
    async fn checkout(&self, ref_name: &str, create_new: bool) -> Result<(), DoltError> {
        let result = if create_new {
            self.run_dolt(&["checkout", "-b", ref_name]).await
        } else {
            self.run_dolt(&["checkout", ref_name]).await
        };
        match result {
            Ok(_) => {
                info!(ref_name, create_new, "dolt checkout completed");
                Ok(())
            }
            Err(DoltError::CommandFailed { exit_code: _, stderr })
                if stderr.to_lowercase().contains("not found")
                    || stderr.to_lowercase().contains("does not exist") =>
            {
                Err(DoltError::BranchNotFound(ref_name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn stage_all(&self) -> Result<(), DoltError> {
        self.run_dolt(&["add", "-A"]).await?;
        Ok(())
    }

    async fn has_uncommitted_changes(&self) -> Result<bool, DoltError> {
        let rows = self.sql("SELECT COUNT(*) AS n FROM dolt_status").await?;
        let n = rows.first().and_then(|row| row_i64(row, "n")).unwrap_or(0);
        Ok(n > 0)
    }

    #[instrument(skip(self, message), fields(repo = %self.repo_path_str))]
    async fn commit(&self, message: &str) -> Result<String, DoltError> {
        self.run_dolt(&["commit", "-m", message]).await?;
        let hash = self.head_commit().await?;
        info!(hash = %hash, "dolt commit succeeded");
        Ok(hash)
    }

    #[instrument(skip(self), fields(repo = %self.repo_path_str))]
    async fn push(&self, remote: &str, branch: &str) -> Result<PushOutcome, DoltError> {
        match self.run_dolt(&["push", remote, branch]).await {
            Ok(stdout) => {
                let kind = classify_push_output(&stdout);
                debug!(?kind, "dolt push completed");
                Ok(PushOutcome {
                    kind,
                    detail: stdout.trim().to_string(),
                })
            }
            Err(DoltError::CommandFailed { exit_code, stderr }) => {
                Err(classify_push_failure(branch, exit_code, &stderr))
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(repo = %self.repo_path_str))]
    async fn merge(&self, source_branch: &str) -> Result<MergeReport, DoltError> {
        let rows = self
            .sql(&format!("CALL DOLT_MERGE({})", sql_quote(source_branch)))
            .await?;
        let row = rows.first().ok_or_else(|| {
            DoltError::OutputParseError("DOLT_MERGE returned no result row".into())
        })?;

        let conflicts = row_i64(row, "conflicts").unwrap_or(0).max(0) as usize;
        let fast_forward = row_i64(row, "fast_forward").unwrap_or(0) != 0;
        let hash = row_string(row, "hash").filter(|h| !h.is_empty());

        let merge_commit = if conflicts == 0 {
            // A fast-forward reports the moved head; a merge commit its hash.
            match hash {
                Some(h) => Some(h),
                None => Some(self.head_commit().await?),
            }
        } else {
            None
        };

        info!(source_branch, conflicts, fast_forward, "dolt merge completed");
        Ok(MergeReport {
            merge_commit,
            fast_forward,
            conflict_tables: conflicts,
        })
    }

    async fn abort_merge(&self) -> Result<(), DoltError> {
        self.sql("CALL DOLT_MERGE('--abort')").await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = %self.repo_path_str))]
    async fn reset_hard(&self, target: &str) -> Result<(), DoltError> {
        self.sql(&format!("CALL DOLT_RESET('--hard', {})", sql_quote(target)))
            .await?;
        info!(target, "dolt reset --hard completed");
        Ok(())
    }

    async fn merge_base(&self, a: &str, b: &str) -> Result<String, DoltError> {
        self.sql_scalar_string(
            &format!(
                "SELECT dolt_merge_base({}, {}) AS base",
                sql_quote(a),
                sql_quote(b)
            ),
            "base",
        )
        .await
    }

    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>, DoltError> {
        self.sql(sql).await
    }

    async fn execute(&self, sql: &str) -> Result<u64, DoltError> {
        // Each `dolt sql` invocation is its own session, so ROW_COUNT() must
        // be read in the same invocation as the statement it measures.
        let combined = format!("{}; SELECT ROW_COUNT() AS affected;", sql.trim_end_matches(';'));
        let rows = self.sql(&combined).await?;
        let affected = rows
            .last()
            .and_then(|row| row_i64(row, "affected"))
            .unwrap_or(0);
        Ok(affected.max(0) as u64)
    }

    /// Preview merge conflicts without disturbing the working branch.
    ///
    /// Dolt has no read-only preview primitive, so this performs the merge
    /// on a throwaway branch, collects the conflict tables and their rows,
    /// then aborts and returns to the original branch. Any failure along the
    /// way is reported as "facility unavailable" (`Ok(None)`) after
    /// best-effort cleanup -- the analyzer flags that case explicitly.
    #[instrument(skip(self), fields(repo = %self.repo_path_str))]
    async fn preview_merge_conflicts(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Option<JsonValue>, DoltError> {
        let original = self.current_branch().await?;
        let preview = format!("doltvec/preview-{}", uuid::Uuid::new_v4().simple());

        if self.checkout(target_branch, false).await.is_err() {
            return Ok(None);
        }
        if self.checkout(&preview, true).await.is_err() {
            let _ = self.checkout(&original, false).await;
            return Ok(None);
        }

        let result = self.preview_on_branch(source_branch, target_branch).await;

        // Cleanup is best-effort; the preview branch must not leak.
        let _ = self.abort_merge().await;
        let _ = self.checkout(&original, false).await;
        if let Err(e) = self.delete_branch(&preview).await {
            warn!(branch = %preview, error = %e, "failed to delete preview branch");
        }

        match result {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                warn!(error = %e, "merge preview failed; reporting facility unavailable");
                Ok(None)
            }
        }
    }

    async fn conflict_rows(&self, table: &str) -> Result<Vec<SqlRow>, DoltError> {
        self.sql(&format!("SELECT * FROM `dolt_conflicts_{table}`"))
            .await
    }

    async fn resolve_conflicts(&self, table: &str, side: ResolveSide) -> Result<(), DoltError> {
        self.run_dolt(&["conflicts", "resolve", side.as_flag(), table])
            .await?;
        debug!(table, side = side.as_flag(), "resolved conflicts via dolt");
        Ok(())
    }
}

impl DoltCli {
    async fn preview_on_branch(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<JsonValue, DoltError> {
        let merge_rows = self
            .sql(&format!("CALL DOLT_MERGE({})", sql_quote(source_branch)))
            .await?;
        let conflicts = merge_rows
            .first()
            .and_then(|row| row_i64(row, "conflicts"))
            .unwrap_or(0);

        let mut tables = Vec::new();
        if conflicts > 0 {
            let summary = self
                .sql("SELECT `table`, num_conflicts FROM dolt_conflicts")
                .await?;
            for row in &summary {
                let Some(table) = row_string(row, "table") else {
                    continue;
                };
                let rows = self
                    .sql(&format!("SELECT * FROM `dolt_conflicts_{table}`"))
                    .await
                    .unwrap_or_default();
                tables.push(json!({
                    "table": table,
                    "num_conflicts": row_i64(row, "num_conflicts").unwrap_or(0),
                    "rows": rows,
                }));
            }
        }

        Ok(json!({
            "source": source_branch,
            "target": target_branch,
            "conflict_tables": tables,
        }))
    }
}

impl AsRef<Path> for DoltCli {
    fn as_ref(&self) -> &Path {
        &self.repo_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_construction() {
        let client = DoltCli::new("dolt", "/srv/repos/knowledge");
        assert_eq!(client.repo_path(), "/srv/repos/knowledge");
    }
}
