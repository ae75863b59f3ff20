//! Logical/physical document-id mapping.
//!
//! The vector store may shard one logical document into several physical
//! entries named `<doc_id><separator><n>` (by default `<doc_id>_chunk_<n>`).
//! Everything that compares identities between the versioned store and the
//! vector store must normalize through [`logical_id`], and deletions must
//! expand a logical id into all of its physical chunk ids first.

use crate::errors::ChromaError;
use crate::store::VectorStore;

/// Default separator between a document id and its chunk ordinal.
pub const DEFAULT_CHUNK_SEPARATOR: &str = "_chunk_";

/// Strip the chunk suffix from a physical id, yielding the logical document
/// id. Ids without a `<separator><digits>` tail are returned unchanged --
/// a document stored as a single un-chunked entry keeps its bare id.
pub fn logical_id<'a>(physical_id: &'a str, separator: &str) -> &'a str {
    if let Some(pos) = physical_id.rfind(separator) {
        let tail = &physical_id[pos + separator.len()..];
        if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
            return &physical_id[..pos];
        }
    }
    physical_id
}

/// Whether `physical_id` belongs to the logical document `doc_id`.
pub fn belongs_to(physical_id: &str, doc_id: &str, separator: &str) -> bool {
    logical_id(physical_id, separator) == doc_id
}

/// Expand logical document ids into every physical id present in the
/// collection: all chunk-suffixed entries plus the bare id when the
/// document was stored as a single chunk.
pub async fn expand_physical_ids(
    store: &dyn VectorStore,
    collection: &str,
    doc_ids: &[String],
    separator: &str,
) -> Result<Vec<String>, ChromaError> {
    let records = store.get_documents(collection, None, None).await?;
    let mut physical = Vec::new();
    for record in &records {
        if doc_ids
            .iter()
            .any(|doc| belongs_to(&record.id, doc, separator))
        {
            physical.push(record.id.clone());
        }
    }
    Ok(physical)
}
