//! Index store abstraction and its implementations.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by an [`IndexStore`] write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The store could not be reached or the connection dropped mid-write.
    #[error("index store unreachable: {0}")]
    Transport(String),

    /// The store answered but refused the document.
    #[error("index store rejected document with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("index store error: {0}")]
    Store(String),
}

impl IndexError {
    pub fn store<T: Into<String>>(msg: T) -> Self {
        IndexError::Store(msg.into())
    }
}

/// Acknowledgement for one indexed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedDocument {
    /// Identifier assigned by the store, when it reports one.
    pub id: Option<String>,
}

/// The one operation the pipeline needs from a document index.
///
/// Documents are written without an identifier; the store assigns one.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn index_document(
        &self,
        index: &str,
        category: &str,
        payload: Bytes,
    ) -> Result<IndexedDocument, IndexError>;
}

/// Configuration for selecting and building a store.
///
/// # Example
/// ```
/// use perfreport::StoreConfig;
///
/// let config = StoreConfig::elasticsearch("http://localhost:9200");
/// let store = config.build().unwrap();
/// # let _ = store;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// An Elasticsearch-compatible HTTP endpoint.
    Elasticsearch {
        #[serde(default = "default_url")]
        url: String,
        #[serde(default = "default_request_timeout_secs")]
        request_timeout_secs: u64,
    },
    /// Keep documents in process memory. Useful for local runs and tests.
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Elasticsearch {
            url: default_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn elasticsearch<U: Into<String>>(url: U) -> Self {
        StoreConfig::Elasticsearch {
            url: url.into(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn memory() -> Self {
        StoreConfig::Memory
    }

    pub fn build(&self) -> Result<Arc<dyn IndexStore>, IndexError> {
        match self {
            StoreConfig::Elasticsearch {
                url,
                request_timeout_secs,
            } => Ok(Arc::new(ElasticsearchStore::new(
                url,
                Duration::from_secs(*request_timeout_secs),
            )?)),
            StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        }
    }
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Writes documents with `POST {url}/{index}/{category}`.
pub struct ElasticsearchStore {
    client: reqwest::Client,
    base_url: String,
}

/// The part of the index response we care about.
#[derive(Debug, Deserialize)]
struct IndexAck {
    #[serde(rename = "_id")]
    id: Option<String>,
}

impl ElasticsearchStore {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| IndexError::store(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn document_url(&self, index: &str, category: &str) -> String {
        format!("{}/{}/{}", self.base_url, index, category)
    }
}

#[async_trait]
impl IndexStore for ElasticsearchStore {
    async fn index_document(
        &self,
        index: &str,
        category: &str,
        payload: Bytes,
    ) -> Result<IndexedDocument, IndexError> {
        let response = self
            .client
            .post(self.document_url(index, category))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|err| IndexError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| IndexError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(IndexError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let id = serde_json::from_slice::<IndexAck>(&body)
            .ok()
            .and_then(|ack| ack.id);
        Ok(IndexedDocument { id })
    }
}

/// A document held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub index: String,
    pub category: String,
    pub payload: Bytes,
}

/// In-memory store that keeps documents in write order.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<Vec<StoredDocument>>,
    failures_remaining: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with [`IndexError::Transport`].
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn documents(&self) -> Vec<StoredDocument> {
        self.documents
            .lock()
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn index_document(
        &self,
        index: &str,
        category: &str,
        payload: Bytes,
    ) -> Result<IndexedDocument, IndexError> {
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(IndexError::Transport("injected failure".to_string()));
        }

        let mut docs = self
            .documents
            .lock()
            .map_err(|_| IndexError::store("memory store lock poisoned"))?;
        let id = format!("mem-{}", docs.len() + 1);
        docs.push(StoredDocument {
            id: id.clone(),
            index: index.to_string(),
            category: category.to_string(),
            payload,
        });

        Ok(IndexedDocument { id: Some(id) })
    }
}
