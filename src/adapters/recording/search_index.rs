//! Recording adapter for the `SearchIndex` port.

use std::sync::Arc;

use super::{record_result, SharedRecorder};
use crate::ports::search_index::{FetchQuery, SearchFuture, SearchIndex, SearchQuery};

/// Records searches and fetches while delegating to an inner implementation.
pub struct RecordingSearchIndex {
    inner: Box<dyn SearchIndex>,
    recorder: SharedRecorder,
}

impl RecordingSearchIndex {
    /// Wrap `inner`, recording into `recorder`.
    pub fn new(inner: Box<dyn SearchIndex>, recorder: SharedRecorder) -> Self {
        Self { inner, recorder }
    }
}

impl SearchIndex for RecordingSearchIndex {
    fn search(&self, query: &SearchQuery) -> SearchFuture<'_> {
        let query = query.clone();
        let recorder = Arc::clone(&self.recorder);

        Box::pin(async move {
            let result = self.inner.search(&query).await;
            record_result(&recorder, "search_index", "search", &query, &result);
            result
        })
    }

    fn fetch(&self, query: &FetchQuery) -> SearchFuture<'_> {
        let query = query.clone();
        let recorder = Arc::clone(&self.recorder);

        Box::pin(async move {
            let result = self.inner.fetch(&query).await;
            record_result(&recorder, "search_index", "fetch", &query, &result);
            result
        })
    }
}
