//! Hosted search index port.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TatttyError;

/// Full-text / semantic query against one index.
#[derive(Debug, Clone, Serialize)]
pub struct SearchQuery {
    /// Index name.
    pub index: String,
    /// Query text; empty lists everything.
    pub query: String,
    /// Maximum number of documents.
    pub limit: u32,
    /// Ask the provider to rerank results.
    pub reranking: bool,
}

/// Lookup of documents by id.
#[derive(Debug, Clone, Serialize)]
pub struct FetchQuery {
    /// Index name.
    pub index: String,
    /// Document ids.
    pub ids: Vec<String>,
}

/// A ranked document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Document id.
    pub id: String,
    /// Relevance score, absent for fetches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Searchable content fields.
    #[serde(default)]
    pub content: Map<String, Value>,
    /// Non-searchable metadata fields.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SearchDocument {
    /// A string field from `metadata`, if present and non-blank.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
    }

    /// A string field from `content`, if present.
    #[must_use]
    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }
}

/// Boxed future type returned by [`SearchIndex`] methods.
pub type SearchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<SearchDocument>, TatttyError>> + Send + 'a>>;

/// Queries a hosted search index.
pub trait SearchIndex: Send + Sync {
    /// Ranked search.
    fn search(&self, query: &SearchQuery) -> SearchFuture<'_>;

    /// Fetch documents by id.
    fn fetch(&self, query: &FetchQuery) -> SearchFuture<'_>;
}
