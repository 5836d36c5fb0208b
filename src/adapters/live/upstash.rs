//! Live adapter for the Upstash Search REST API.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::TatttyError;
use crate::ports::search_index::{
    FetchQuery, SearchDocument, SearchFuture, SearchIndex, SearchQuery,
};

/// Search index client authenticated with a REST token.
pub struct UpstashSearch {
    client: Client,
    url: String,
    token: String,
}

impl UpstashSearch {
    /// Create a client for the given REST URL and token.
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self { client: Client::new(), url, token: token.into() }
    }

    async fn post(
        &self,
        path: String,
        body: serde_json::Value,
    ) -> Result<Vec<SearchDocument>, TatttyError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(TatttyError::Api { status: status.as_u16(), message: response_text });
        }

        let parsed: UpstashResponse = serde_json::from_str(&response_text).map_err(|e| {
            TatttyError::Api { status: 200, message: format!("Failed to parse response: {e}") }
        })?;
        // Fetches answer `null` for unknown ids.
        Ok(parsed.result.into_iter().flatten().collect())
    }
}

impl SearchIndex for UpstashSearch {
    fn search(&self, query: &SearchQuery) -> SearchFuture<'_> {
        let query = query.clone();
        Box::pin(async move {
            let body = json!({
                "query": query.query,
                "topK": query.limit,
                "reranking": query.reranking,
            });
            self.post(format!("search/{}", query.index), body).await
        })
    }

    fn fetch(&self, query: &FetchQuery) -> SearchFuture<'_> {
        let query = query.clone();
        Box::pin(async move {
            let body = json!({ "ids": query.ids });
            self.post(format!("fetch/{}", query.index), body).await
        })
    }
}

#[derive(Deserialize)]
struct UpstashResponse {
    #[serde(default)]
    result: Vec<Option<SearchDocument>>,
}
