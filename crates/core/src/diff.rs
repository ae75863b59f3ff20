//! Commit-delta detection.
//!
//! The [`DeltaDetector`] computes document-level change sets between two
//! commits of the versioned store by comparing content hashes, never full
//! content: equal hashes mean unchanged, a hash present only at the newer
//! commit means added, only at the older commit means removed, and differing
//! hashes mean modified.
//!
//! Expected table shape: `documents (doc_id, collection_name, title,
//! content, content_hash, metadata)` plus a `collections (name)` registry.
//! Document ids here are logical; mapping to the vector store's physical
//! chunk ids happens at the sync layer via [`crate::chroma::chunk`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dolt::parser::{row_string, sql_quote};
use crate::errors::DoltError;
use crate::models::{DiffRow, DiffType};
use crate::store::{SqlRow, VersionedStore};

/// Snapshot of one document at one commit.
#[derive(Debug, Clone)]
struct DocState {
    title: String,
    content_hash: String,
}

/// Result of scanning every collection between two commits.
#[derive(Debug, Clone, Default)]
pub struct DeltaScan {
    pub rows: Vec<DiffRow>,
    /// Collections whose diff failed and was skipped.
    pub failed_collections: Vec<String>,
}

/// Computes document-level deltas between commits.
pub struct DeltaDetector {
    store: Arc<dyn VersionedStore>,
}

impl DeltaDetector {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }

    /// Collections present in the versioned store's schema.
    pub async fn available_collections(&self) -> Result<Vec<String>, DoltError> {
        let rows = self
            .store
            .query("SELECT name FROM collections ORDER BY name")
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row_string(row, "name"))
            .collect())
    }

    /// Every document in a collection at HEAD, classified as added.
    ///
    /// Used for the root-commit case, where there is no parent to diff
    /// against and everything present counts as new.
    pub async fn all_documents(&self, collection: &str) -> Result<Vec<DiffRow>, DoltError> {
        let rows = self
            .store
            .query(&format!(
                "SELECT doc_id, title, content_hash FROM documents \
                 WHERE collection_name = {} ORDER BY doc_id",
                sql_quote(collection)
            ))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(DiffRow {
                    doc_id: row_string(row, "doc_id")?,
                    collection: collection.to_string(),
                    title: row_string(row, "title").unwrap_or_default(),
                    diff_type: DiffType::Added,
                })
            })
            .collect())
    }

    /// Ordered change set for one collection between two commits.
    ///
    /// `from = None` is the root-commit case: every document at `to` is
    /// reported as added.
    pub async fn commit_diff(
        &self,
        from: Option<&str>,
        to: &str,
        collection: &str,
    ) -> Result<Vec<DiffRow>, DoltError> {
        let to_docs = self.documents_at(to, collection).await?;

        let from_docs = match from {
            Some(commit) => self.documents_at(commit, collection).await?,
            None => BTreeMap::new(),
        };

        let rows = classify(&from_docs, &to_docs, collection);
        debug!(
            collection,
            from = from.unwrap_or("<root>"),
            to,
            changes = rows.len(),
            "computed commit diff"
        );
        Ok(rows)
    }

    /// Diff every collection between two commits.
    ///
    /// A collection-level failure is logged and that collection is skipped;
    /// it must not mask changes elsewhere. The skipped names are reported so
    /// callers can surface a partial result.
    pub async fn diff_all_collections(
        &self,
        from: Option<&str>,
        to: &str,
    ) -> Result<DeltaScan, DoltError> {
        let collections = self.available_collections().await?;
        let mut scan = DeltaScan::default();

        for collection in collections {
            match self.commit_diff(from, to, &collection).await {
                Ok(mut rows) => scan.rows.append(&mut rows),
                Err(e) => {
                    warn!(collection = %collection, error = %e, "collection diff failed; skipping");
                    scan.failed_collections.push(collection);
                }
            }
        }

        info!(
            changes = scan.rows.len(),
            failed = scan.failed_collections.len(),
            "collection scan complete"
        );
        Ok(scan)
    }

    async fn documents_at(
        &self,
        commit: &str,
        collection: &str,
    ) -> Result<BTreeMap<String, DocState>, DoltError> {
        let rows = self
            .store
            .query(&format!(
                "SELECT doc_id, title, content_hash FROM documents AS OF {} \
                 WHERE collection_name = {}",
                sql_quote(commit),
                sql_quote(collection)
            ))
            .await?;
        Ok(index_rows(&rows))
    }
}

fn index_rows(rows: &[SqlRow]) -> BTreeMap<String, DocState> {
    rows.iter()
        .filter_map(|row| {
            let doc_id = row_string(row, "doc_id")?;
            Some((
                doc_id,
                DocState {
                    title: row_string(row, "title").unwrap_or_default(),
                    content_hash: row_string(row, "content_hash").unwrap_or_default(),
                },
            ))
        })
        .collect()
}

/// Classify hash differences between two snapshots of a collection.
///
/// Output order is deterministic: additions and modifications sorted by
/// doc id, then removals sorted by doc id.
fn classify(
    from_docs: &BTreeMap<String, DocState>,
    to_docs: &BTreeMap<String, DocState>,
    collection: &str,
) -> Vec<DiffRow> {
    let mut rows = Vec::new();

    for (doc_id, to_state) in to_docs {
        match from_docs.get(doc_id) {
            None => rows.push(DiffRow {
                doc_id: doc_id.clone(),
                collection: collection.to_string(),
                title: to_state.title.clone(),
                diff_type: DiffType::Added,
            }),
            Some(from_state) if from_state.content_hash != to_state.content_hash => {
                rows.push(DiffRow {
                    doc_id: doc_id.clone(),
                    collection: collection.to_string(),
                    title: to_state.title.clone(),
                    diff_type: DiffType::Modified,
                });
            }
            Some(_) => {}
        }
    }

    for (doc_id, from_state) in from_docs {
        if !to_docs.contains_key(doc_id) {
            rows.push(DiffRow {
                doc_id: doc_id.clone(),
                collection: collection.to_string(),
                title: from_state.title.clone(),
                diff_type: DiffType::Removed,
            });
        }
    }

    rows
}
