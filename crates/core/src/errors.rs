//! Error types for the doltvec core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! Orchestration entry points (commit, push, merge, reset) do not surface
//! these directly; they return [`crate::models::SyncOutcome`] result objects
//! and reserve `Err` for unrecoverable conditions such as ledger corruption.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Dolt(#[from] DoltError),

    #[error(transparent)]
    Chroma(#[from] ChromaError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Dolt errors
// ---------------------------------------------------------------------------

/// Errors from `dolt` CLI operations.
#[derive(Debug, Error)]
pub enum DoltError {
    /// The `dolt` binary was not found on `$PATH`.
    #[error("dolt binary not found: {0}")]
    BinaryNotFound(String),

    /// A `dolt` command exited with a non-zero status.
    #[error("dolt command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// Could not parse the JSON output produced by `dolt sql -r json`.
    #[error("failed to parse dolt output: {0}")]
    OutputParseError(String),

    /// The requested branch does not exist.
    #[error("dolt branch not found: {0}")]
    BranchNotFound(String),

    /// The requested commit does not exist.
    #[error("dolt commit not found: {0}")]
    CommitNotFound(String),

    /// No remote is configured (or the named remote is missing).
    #[error("dolt remote not found: {0}")]
    RemoteNotFound(String),

    /// The remote rejected the push (e.g. non-fast-forward).
    #[error("dolt push rejected for branch '{branch}': {detail}")]
    PushRejected { branch: String, detail: String },

    /// Authentication with the remote failed.
    #[error("dolt authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A merge produced conflicts that stopped the operation.
    #[error("dolt merge conflict in {0} table(s)")]
    MergeConflict(usize),

    /// Generic I/O wrapper.
    #[error("dolt I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Chroma errors
// ---------------------------------------------------------------------------

/// Errors from ChromaDB REST API interactions.
#[derive(Debug, Error)]
pub enum ChromaError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("chroma HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("chroma API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// The named collection does not exist.
    #[error("chroma collection not found: {0}")]
    CollectionNotFound(String),

    /// JSON deserialization failure.
    #[error("chroma response parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Sync manager errors
// ---------------------------------------------------------------------------

/// Errors from the synchronization orchestrator.
///
/// Most sync failures are reported through [`crate::models::SyncOutcome`];
/// this type covers the underlying causes that get wrapped into outcomes
/// and the few conditions that are genuinely fatal.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another sync operation holds the per-repository guard.
    #[error("sync already in progress for '{repo_path}'")]
    AlreadyRunning { repo_path: String },

    /// Underlying versioned-store error during sync.
    #[error("sync dolt error: {0}")]
    DoltError(#[from] DoltError),

    /// Underlying vector-store error during sync.
    #[error("sync chroma error: {0}")]
    ChromaError(#[from] ChromaError),

    /// Deletion-ledger error during sync.
    #[error("sync ledger error: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// Conflict subsystem error during sync.
    #[error("sync conflict error: {0}")]
    ConflictError(#[from] ConflictError),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from the conflict analysis / resolution subsystem.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The requested conflict ID was not found in the conflict table.
    #[error("conflict not found: {0}")]
    NotFound(String),

    /// A resolution update affected zero rows.
    ///
    /// This indicates the conflict table and the orchestration logic have
    /// drifted out of sync and must not be ignored.
    #[error("resolution for '{table}' document '{doc_id}' updated no rows")]
    NoRowsUpdated { table: String, doc_id: String },

    /// The provided resolution request is invalid.
    #[error("invalid resolution for conflict {id}: {detail}")]
    InvalidResolution { id: String, detail: String },

    /// The raw conflict payload could not be translated.
    #[error("conflict payload parse error: {0}")]
    ParseError(String),

    /// Underlying versioned-store error.
    #[error("conflict dolt error: {0}")]
    DoltError(#[from] DoltError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database (deletion ledger) errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite deletion-ledger layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("ledger error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// The ledger storage could not be created or opened.
    #[error("ledger storage init failed at '{path}': {detail}")]
    StorageInit { path: String, detail: String },

    /// A migration failed.
    #[error("ledger migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("ledger I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = DoltError::BranchNotFound("feature/x".into());
        assert_eq!(err.to_string(), "dolt branch not found: feature/x");

        let err = ChromaError::CollectionNotFound("notes".into());
        assert_eq!(err.to_string(), "chroma collection not found: notes");

        let err = ConflictError::NoRowsUpdated {
            table: "documents".into(),
            doc_id: "doc-1".into(),
        };
        assert!(err.to_string().contains("updated no rows"));

        let err = DatabaseError::StorageInit {
            path: "/tmp/ledger.db".into(),
            detail: "permission denied".into(),
        };
        assert!(err.to_string().contains("/tmp/ledger.db"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let dolt_err = DoltError::CommitNotFound("abcd1234".into());
        let core_err: CoreError = dolt_err.into();
        assert!(matches!(core_err, CoreError::Dolt(_)));

        let db_err = DatabaseError::NotFound {
            entity: "deletion record".into(),
            id: "7".into(),
        };
        let core_err: CoreError = CoreError::Database(db_err);
        assert!(matches!(core_err, CoreError::Database(_)));
    }
}
