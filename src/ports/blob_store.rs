//! Blob storage port for persisted gallery images.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::TatttyError;

/// A stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobObject {
    /// Public URL.
    pub url: String,
    /// URL that forces a download, when the store provides one.
    #[serde(default)]
    pub download_url: Option<String>,
    /// Path within the store.
    pub pathname: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Upload time as reported by the store.
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

impl BlobObject {
    /// The URL to display: download URL first, then the public URL.
    #[must_use]
    pub fn preferred_url(&self) -> &str {
        self.download_url.as_deref().filter(|u| !u.is_empty()).unwrap_or(&self.url)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobPage {
    /// Blobs on this page.
    pub blobs: Vec<BlobObject>,
    /// Cursor for the next page.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Whether another page exists.
    #[serde(default)]
    pub has_more: bool,
}

/// A file to upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// File name, used as the blob pathname.
    pub name: String,
    /// MIME type.
    pub content_type: String,
    /// File bytes.
    pub data: Vec<u8>,
}

/// Boxed future type returned by [`BlobStore::list`].
pub type ListFuture<'a> = Pin<Box<dyn Future<Output = Result<BlobPage, TatttyError>> + Send + 'a>>;

/// Boxed future type returned by [`BlobStore::put`].
pub type PutFuture<'a> = Pin<Box<dyn Future<Output = Result<BlobObject, TatttyError>> + Send + 'a>>;

/// Lists and stores blobs.
pub trait BlobStore: Send + Sync {
    /// List one page, starting at `cursor`.
    fn list(&self, cursor: Option<String>, limit: u32) -> ListFuture<'_>;

    /// Upload a file.
    fn put(&self, file: &UploadFile) -> PutFuture<'_>;
}
