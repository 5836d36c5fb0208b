//! Replaying adapter for the `SearchIndex` port.

use super::{next_output, replay_result, SharedReplayer};
use crate::ports::search_index::{
    FetchQuery, SearchDocument, SearchFuture, SearchIndex, SearchQuery,
};

/// Serves recorded search results.
pub struct ReplayingSearchIndex {
    replayer: SharedReplayer,
}

impl ReplayingSearchIndex {
    /// Create an index backed by the given replayer.
    #[must_use]
    pub fn new(replayer: SharedReplayer) -> Self {
        Self { replayer }
    }
}

impl SearchIndex for ReplayingSearchIndex {
    fn search(&self, _query: &SearchQuery) -> SearchFuture<'_> {
        let output = next_output(&self.replayer, "search_index", "search");
        Box::pin(async move { replay_result::<Vec<SearchDocument>>(output) })
    }

    fn fetch(&self, _query: &FetchQuery) -> SearchFuture<'_> {
        let output = next_output(&self.replayer, "search_index", "fetch");
        Box::pin(async move { replay_result::<Vec<SearchDocument>>(output) })
    }
}
