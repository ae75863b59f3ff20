//! ChromaDB REST API client.
//!
//! Talks to the Chroma v2 HTTP API. Collections are addressed by name at
//! this layer; the client resolves names to collection ids and caches the
//! mapping for the lifetime of the handle.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::ChromaConfig;
use crate::errors::ChromaError;
use crate::store::{VectorRecord, VectorStore};

#[derive(Debug, Clone, Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<serde_json::Map<String, JsonValue>>>>,
}

/// HTTP client for a ChromaDB server.
pub struct ChromaHttp {
    http: reqwest::Client,
    base: String,
    /// Name -> collection id cache.
    collections: Mutex<HashMap<String, String>>,
}

impl ChromaHttp {
    /// Build a client from configuration. The auth token, if present, is
    /// attached to every request.
    pub fn new(config: &ChromaConfig) -> Result<Self, ChromaError> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = config.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ChromaError::ParseError(format!("invalid auth token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        let base = format!(
            "{}/api/v2/tenants/{}/databases/{}",
            config.base_url.trim_end_matches('/'),
            config.tenant,
            config.database
        );

        info!(base = %base, "created ChromaHttp client");
        Ok(Self {
            http,
            base,
            collections: Mutex::new(HashMap::new()),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ChromaError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChromaError::ApiError {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_collections(&self) -> Result<Vec<CollectionInfo>, ChromaError> {
        let url = format!("{}/collections", self.base);
        let response = Self::check(self.http.get(&url).send().await?).await?;
        let infos: Vec<CollectionInfo> = response
            .json()
            .await
            .map_err(|e| ChromaError::ParseError(e.to_string()))?;
        Ok(infos)
    }

    /// Resolve a collection name to its id, refreshing the cache on miss.
    async fn collection_id(&self, name: &str) -> Result<String, ChromaError> {
        {
            let cache = self.collections.lock().await;
            if let Some(id) = cache.get(name) {
                return Ok(id.clone());
            }
        }

        let infos = self.fetch_collections().await?;
        let mut cache = self.collections.lock().await;
        cache.clear();
        for info in &infos {
            cache.insert(info.name.clone(), info.id.clone());
        }
        cache
            .get(name)
            .cloned()
            .ok_or_else(|| ChromaError::CollectionNotFound(name.to_string()))
    }

    fn payload(records: &[VectorRecord]) -> JsonValue {
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let documents: Vec<&str> = records.iter().map(|r| r.document.as_str()).collect();
        let metadatas: Vec<JsonValue> = records
            .iter()
            .map(|r| match &r.metadata {
                Some(m) => JsonValue::Object(m.clone()),
                None => JsonValue::Null,
            })
            .collect();
        json!({ "ids": ids, "documents": documents, "metadatas": metadatas })
    }
}

#[async_trait]
impl VectorStore for ChromaHttp {
    #[instrument(skip(self))]
    async fn list_collections(&self) -> Result<Vec<String>, ChromaError> {
        let infos = self.fetch_collections().await?;
        Ok(infos.into_iter().map(|c| c.name).collect())
    }

    #[instrument(skip(self, metadata))]
    async fn create_collection(
        &self,
        name: &str,
        metadata: Option<serde_json::Map<String, JsonValue>>,
    ) -> Result<(), ChromaError> {
        let url = format!("{}/collections", self.base);
        let body = json!({
            "name": name,
            "metadata": metadata,
            "get_or_create": true,
        });
        let response = Self::check(self.http.post(&url).json(&body).send().await?).await?;

        // Cache the id straight from the creation response when available.
        if let Ok(info) = response.json::<CollectionInfo>().await {
            self.collections
                .lock()
                .await
                .insert(info.name.clone(), info.id);
        }
        debug!(name, "collection created (or already existed)");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_collection(&self, name: &str) -> Result<(), ChromaError> {
        let id = self.collection_id(name).await?;
        let url = format!("{}/collections/{}", self.base, id);
        Self::check(self.http.delete(&url).send().await?).await?;
        self.collections.lock().await.remove(name);
        debug!(name, "collection deleted");
        Ok(())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn add_documents(
        &self,
        collection: &str,
        records: &[VectorRecord],
        allow_duplicate_ids: bool,
    ) -> Result<(), ChromaError> {
        if records.is_empty() {
            return Ok(());
        }

        let records = if allow_duplicate_ids {
            records.to_vec()
        } else {
            // Filter out ids already present so the add is idempotent.
            let existing: Vec<String> = self
                .get_documents(collection, None, None)
                .await?
                .into_iter()
                .map(|r| r.id)
                .collect();
            let fresh: Vec<VectorRecord> = records
                .iter()
                .filter(|r| !existing.contains(&r.id))
                .cloned()
                .collect();
            if fresh.len() < records.len() {
                warn!(
                    collection,
                    skipped = records.len() - fresh.len(),
                    "skipping duplicate ids on add"
                );
            }
            fresh
        };
        if records.is_empty() {
            return Ok(());
        }

        let id = self.collection_id(collection).await?;
        let url = format!("{}/collections/{}/add", self.base, id);
        Self::check(self.http.post(&url).json(&Self::payload(&records)).send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn update_documents(
        &self,
        collection: &str,
        records: &[VectorRecord],
    ) -> Result<(), ChromaError> {
        if records.is_empty() {
            return Ok(());
        }
        let id = self.collection_id(collection).await?;
        let url = format!("{}/collections/{}/update", self.base, id);
        Self::check(self.http.post(&url).json(&Self::payload(records)).send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_documents(&self, collection: &str, ids: &[String]) -> Result<(), ChromaError> {
        if ids.is_empty() {
            return Ok(());
        }
        let id = self.collection_id(collection).await?;
        let url = format!("{}/collections/{}/delete", self.base, id);
        Self::check(
            self.http
                .post(&url)
                .json(&json!({ "ids": ids }))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn get_documents(
        &self,
        collection: &str,
        ids: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<VectorRecord>, ChromaError> {
        let id = self.collection_id(collection).await?;
        let url = format!("{}/collections/{}/get", self.base, id);

        let mut body = serde_json::Map::new();
        if let Some(ids) = ids {
            body.insert("ids".into(), json!(ids));
        }
        if let Some(limit) = limit {
            body.insert("limit".into(), json!(limit));
        }
        body.insert("include".into(), json!(["documents", "metadatas"]));

        let response = Self::check(self.http.post(&url).json(&body).send().await?).await?;
        let parsed: GetResponse = response
            .json()
            .await
            .map_err(|e| ChromaError::ParseError(e.to_string()))?;

        let mut records = Vec::with_capacity(parsed.ids.len());
        for (i, doc_id) in parsed.ids.into_iter().enumerate() {
            let document = parsed
                .documents
                .as_ref()
                .and_then(|docs| docs.get(i).cloned().flatten())
                .unwrap_or_default();
            let metadata = parsed
                .metadatas
                .as_ref()
                .and_then(|metas| metas.get(i).cloned().flatten());
            records.push(VectorRecord {
                id: doc_id,
                document,
                metadata,
            });
        }
        Ok(records)
    }

    async fn collection_count(&self, collection: &str) -> Result<usize, ChromaError> {
        let id = self.collection_id(collection).await?;
        let url = format!("{}/collections/{}/count", self.base, id);
        let response = Self::check(self.http.get(&url).send().await?).await?;
        let count: usize = response
            .json()
            .await
            .map_err(|e| ChromaError::ParseError(e.to_string()))?;
        Ok(count)
    }
}
