//! Gallery listing, search and catalog lookups.
//!
//! Listing pages come from the blob store; search and descriptions come
//! from the hosted index. Search failures degrade to empty results so a
//! broken index never takes the gallery down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::TatttyError;
use crate::ports::blob_store::BlobObject;
use crate::ports::search_index::{FetchQuery, SearchDocument, SearchQuery};
use crate::ports::{BlobStore, SearchIndex};

/// Index holding gallery image documents, keyed by blob pathname.
pub const IMAGES_INDEX: &str = "images";
/// Index holding the style/color catalog documents.
pub const SEARCH_DATA_INDEX: &str = "search_data";
/// Page size for blob listings.
pub const PAGE_SIZE: u32 = 24;
/// Documents returned by the raw search-data listing.
pub const SEARCH_DATA_LIMIT: u32 = 100;
/// Documents scanned when building the style and color catalogs.
pub const CATALOG_LIMIT: u32 = 160;
/// Results of an interactive search.
pub const SEARCH_LIMIT: u32 = 10;
/// Quiet period before an interactive search fires.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// One tile in the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    /// Image URL.
    pub url: String,
    /// Display name derived from the URL.
    pub name: String,
    /// Size in bytes, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Human-readable size.
    pub size_label: String,
    /// Stored description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Prompt the image was generated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl GalleryItem {
    /// Item for a bare URL, e.g. an optimistic upload preview.
    #[must_use]
    pub fn from_url(url: impl Into<String>, size: Option<u64>) -> Self {
        let url = url.into();
        Self {
            name: display_name_from_url(&url),
            size_label: format_file_size(size),
            url,
            size,
            description: None,
            prompt: None,
        }
    }

    /// Item for a stored blob.
    #[must_use]
    pub fn from_blob(blob: &BlobObject) -> Self {
        Self::from_url(blob.preferred_url(), blob.size)
    }

    /// Item for an index document; `None` when it carries no URL.
    #[must_use]
    pub fn from_document(doc: &SearchDocument) -> Option<Self> {
        let url = doc
            .metadata_str("url")
            .or_else(|| doc.content_str("url").filter(|u| !u.trim().is_empty()))?;
        let size = doc.metadata.get("size").and_then(Value::as_u64);
        let mut item = Self::from_url(url, size);
        item.description = doc.content_str("text").map(ToString::to_string);
        item.prompt = doc.metadata_str("prompt").map(ToString::to_string);
        Some(item)
    }
}

/// Readable name from a URL: last path segment, extension stripped,
/// hyphens as spaces, percent-decoded.
#[must_use]
pub fn display_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    let Some((_, path)) = path.split_once('/') else {
        return "Untitled".to_string();
    };
    let filename = path.rsplit('/').next().unwrap_or_default();
    if filename.is_empty() {
        return "Untitled".to_string();
    }
    let stem = match filename.rfind('.') {
        Some(dot) if dot > 0 => &filename[..dot],
        _ => filename,
    };
    let spaced = stem.replace('-', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => "Untitled".to_string(),
    }
}

/// Human file size: `512 B`, `1.5 KB`, `2.0 MB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(bytes: Option<u64>) -> String {
    match bytes {
        None | Some(0) => "Unknown size".to_string(),
        Some(b) if b < 1024 => format!("{b} B"),
        Some(b) if b < 1024 * 1024 => format!("{:.1} KB", b as f64 / 1024.0),
        Some(b) => format!("{:.1} MB", b as f64 / (1024.0 * 1024.0)),
    }
}

/// Text to show for a document: first non-blank string in `content`,
/// then in `metadata`, then the id.
#[must_use]
pub fn display_text(doc: &SearchDocument) -> &str {
    fn first_string(map: &serde_json::Map<String, Value>) -> Option<&str> {
        map.values().filter_map(Value::as_str).find(|s| !s.trim().is_empty())
    }
    first_string(&doc.content).or_else(|| first_string(&doc.metadata)).unwrap_or(&doc.id)
}

/// One listing page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPage {
    /// Items on this page.
    pub items: Vec<GalleryItem>,
    /// Cursor for the next page.
    pub cursor: Option<String>,
    /// Whether another page exists.
    pub has_more: bool,
}

/// Fetch one listing page.
///
/// # Errors
///
/// Returns the blob store's error.
pub async fn load_page(
    blobs: &dyn BlobStore,
    cursor: Option<String>,
    limit: u32,
) -> Result<GalleryPage, TatttyError> {
    let page = blobs.list(cursor, limit).await?;
    Ok(GalleryPage {
        items: page.blobs.iter().map(GalleryItem::from_blob).collect(),
        cursor: page.cursor,
        has_more: page.has_more,
    })
}

#[derive(Debug)]
struct PagerState {
    cursor: Option<String>,
    has_more: bool,
    loading: bool,
}

/// Sequential pager over the blob listing.
///
/// At most one fetch runs at a time; once the store reports no more pages
/// the pager stops asking.
pub struct GalleryPager {
    state: Mutex<PagerState>,
    limit: u32,
}

impl GalleryPager {
    /// Pager starting at the first page.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self::resume(None, true, limit)
    }

    /// Pager continuing from a known cursor.
    #[must_use]
    pub fn resume(cursor: Option<String>, has_more: bool, limit: u32) -> Self {
        Self { state: Mutex::new(PagerState { cursor, has_more, loading: false }), limit }
    }

    /// Whether more pages may exist.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.lock().has_more
    }

    /// Fetch the next page. Returns `None` when a fetch is already running
    /// or the listing is exhausted. A failed fetch yields an empty page and
    /// leaves the cursor in place for a retry.
    pub async fn load_more(&self, blobs: &dyn BlobStore) -> Option<Vec<GalleryItem>> {
        let cursor = {
            let mut state = self.lock();
            if state.loading || !state.has_more {
                return None;
            }
            state.loading = true;
            state.cursor.clone()
        };

        let result = load_page(blobs, cursor, self.limit).await;

        let mut state = self.lock();
        state.loading = false;
        match result {
            Ok(page) => {
                state.has_more = page.has_more && page.cursor.is_some();
                state.cursor = page.cursor;
                Some(page.items)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load gallery page");
                Some(Vec::new())
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Server-side search over the gallery index. Failures yield no results.
pub async fn search_gallery(search: &dyn SearchIndex, query: &str) -> Vec<GalleryItem> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let request = SearchQuery {
        index: IMAGES_INDEX.into(),
        query: query.trim().into(),
        limit: SEARCH_LIMIT,
        reranking: true,
    };
    match search.search(&request).await {
        Ok(docs) => docs.iter().filter_map(GalleryItem::from_document).collect(),
        Err(e) => {
            tracing::warn!(error = %e, query, "gallery search failed");
            Vec::new()
        }
    }
}

/// Every document of the catalog index.
///
/// # Errors
///
/// Returns the index error; the HTTP layer reports it as a 500.
pub async fn list_search_data(
    search: &dyn SearchIndex,
) -> Result<Vec<SearchDocument>, TatttyError> {
    search
        .search(&SearchQuery {
            index: SEARCH_DATA_INDEX.into(),
            query: String::new(),
            limit: SEARCH_DATA_LIMIT,
            reranking: false,
        })
        .await
}

/// Client-side filter: documents whose display text contains `query`,
/// case-insensitively. A blank query keeps everything.
#[must_use]
pub fn filter_documents<'a>(docs: &'a [SearchDocument], query: &str) -> Vec<&'a SearchDocument> {
    let needle = query.trim().to_lowercase();
    docs.iter().filter(|d| display_text(d).to_lowercase().contains(&needle)).collect()
}

/// Style and color names published in the catalog index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalogs {
    /// Style names.
    pub styles: Vec<String>,
    /// Color names.
    pub colors: Vec<String>,
}

/// Read the catalogs. Failures yield empty catalogs.
pub async fn fetch_catalogs(search: &dyn SearchIndex) -> Catalogs {
    let request = SearchQuery {
        index: SEARCH_DATA_INDEX.into(),
        query: String::new(),
        limit: CATALOG_LIMIT,
        reranking: false,
    };
    match search.search(&request).await {
        Ok(docs) => {
            let names = |key: &str| -> Vec<String> {
                docs.iter().filter_map(|d| d.metadata_str(key)).map(String::from).collect()
            };
            Catalogs { styles: names("style_name"), colors: names("color_name") }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to fetch catalogs");
            Catalogs::default()
        }
    }
}

/// Stored description of an image, looked up by blob pathname.
///
/// # Errors
///
/// Returns [`TatttyError::Validation`] for a blank pathname, or the index error.
pub async fn fetch_description(
    search: &dyn SearchIndex,
    pathname: &str,
) -> Result<Option<String>, TatttyError> {
    if pathname.trim().is_empty() {
        return Err(TatttyError::Validation("No pathname provided".into()));
    }
    let query = FetchQuery { index: IMAGES_INDEX.into(), ids: vec![pathname.to_string()] };
    let docs = search.fetch(&query).await?;
    Ok(docs.first().and_then(|d| d.content_str("text")).map(ToString::to_string))
}

/// Debounce for interactive search: only the last call within the quiet
/// period runs.
pub struct Debouncer {
    generation: AtomicU64,
    delay: Duration,
}

impl Debouncer {
    /// Debouncer with the given quiet period.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { generation: AtomicU64::new(0), delay }
    }

    /// Wait out the quiet period, then run `task` unless a newer call
    /// arrived meanwhile. Superseded calls return `None`.
    pub async fn run<T, F>(&self, task: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            return None;
        }
        Some(task.await)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(SEARCH_DEBOUNCE)
    }
}

/// A fetched catalog listing, filtered in memory behind a [`Debouncer`].
pub struct LocalSearch {
    docs: Vec<SearchDocument>,
    debouncer: Debouncer,
}

impl LocalSearch {
    /// Wrap a listing with the given debouncer.
    #[must_use]
    pub fn new(docs: Vec<SearchDocument>, debouncer: Debouncer) -> Self {
        Self { docs, debouncer }
    }

    /// Fetch the catalog listing and debounce with [`SEARCH_DEBOUNCE`].
    ///
    /// # Errors
    ///
    /// Returns the index error from [`list_search_data`].
    pub async fn load(search: &dyn SearchIndex) -> Result<Self, TatttyError> {
        let docs = list_search_data(search).await?;
        Ok(Self::new(docs, Debouncer::default()))
    }

    /// Filter once the quiet period passes. `None` when a newer query
    /// superseded this one.
    pub async fn filter(&self, query: &str) -> Option<Vec<&SearchDocument>> {
        self.debouncer.run(async { filter_documents(&self.docs, query) }).await
    }
}
