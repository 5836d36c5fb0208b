//! Live adapter for Vercel Blob storage.

use reqwest::Client;

use crate::error::TatttyError;
use crate::ports::blob_store::{BlobObject, BlobPage, BlobStore, ListFuture, PutFuture, UploadFile};

const VERCEL_BLOB_API: &str = "https://blob.vercel-storage.com";

/// Blob store authenticated with a read/write token.
pub struct VercelBlobStore {
    client: Client,
    base_url: String,
    token: String,
}

impl VercelBlobStore {
    /// Create a store against the public Blob API.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(VERCEL_BLOB_API, token)
    }

    /// Create a store against another host.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client: Client::new(), base_url, token: token.into() }
    }
}

impl BlobStore for VercelBlobStore {
    fn list(&self, cursor: Option<String>, limit: u32) -> ListFuture<'_> {
        Box::pin(async move {
            let mut query = vec![("limit", limit.to_string())];
            if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
                query.push(("cursor", cursor));
            }

            let response = self
                .client
                .get(&self.base_url)
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await?;

            let status = response.status();
            let response_text = response.text().await?;
            if !status.is_success() {
                return Err(TatttyError::Api { status: status.as_u16(), message: response_text });
            }
            serde_json::from_str::<BlobPage>(&response_text).map_err(|e| TatttyError::Api {
                status: 200,
                message: format!("Failed to parse listing: {e}"),
            })
        })
    }

    fn put(&self, file: &UploadFile) -> PutFuture<'_> {
        let file = file.clone();
        Box::pin(async move {
            let pathname = urlencoding::encode(&file.name);
            let size = file.data.len() as u64;

            let response = self
                .client
                .put(format!("{}/{pathname}", self.base_url))
                .bearer_auth(&self.token)
                .header("x-content-type", &file.content_type)
                .header("x-add-random-suffix", "1")
                .body(file.data)
                .send()
                .await?;

            let status = response.status();
            let response_text = response.text().await?;
            if !status.is_success() {
                return Err(TatttyError::Api { status: status.as_u16(), message: response_text });
            }
            let mut blob: BlobObject = serde_json::from_str(&response_text).map_err(|e| {
                TatttyError::Api { status: 200, message: format!("Failed to parse upload: {e}") }
            })?;
            blob.size.get_or_insert(size);
            Ok(blob)
        })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn list_passes_cursor() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/")
                .query_param("limit", "20")
                .query_param("cursor", "c1")
                .header("authorization", "Bearer vb_tok");
            then.status(200).json_body(json!({
                "blobs": [{
                    "url": "https://store.public.blob.vercel-storage.com/koi-sleeve.webp",
                    "downloadUrl": "https://store.blob.example/koi-sleeve.webp?download=1",
                    "pathname": "koi-sleeve.webp",
                    "size": 2048,
                    "uploadedAt": "2026-01-01T00:00:00.000Z"
                }],
                "cursor": "c2",
                "hasMore": true
            }));
        });

        let store = VercelBlobStore::with_base_url(server.base_url(), "vb_tok");
        let page = store.list(Some("c1".into()), 20).await.unwrap();

        mock.assert();
        assert_eq!(page.blobs.len(), 1);
        assert_eq!(page.cursor.as_deref(), Some("c2"));
        assert!(page.has_more);
        assert!(page.blobs[0].preferred_url().ends_with("download=1"));
    }

    #[tokio::test]
    async fn put_uploads_bytes() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT).path("/flash.png").header("x-content-type", "image/png");
            then.status(200).json_body(json!({
                "url": "https://store.public.blob.vercel-storage.com/flash-x1.png",
                "pathname": "flash-x1.png"
            }));
        });

        let store = VercelBlobStore::with_base_url(server.base_url(), "vb_tok");
        let blob = store
            .put(&UploadFile {
                name: "flash.png".into(),
                content_type: "image/png".into(),
                data: vec![0; 16],
            })
            .await
            .unwrap();

        mock.assert();
        assert_eq!(blob.pathname, "flash-x1.png");
        assert_eq!(blob.size, Some(16));
    }
}
