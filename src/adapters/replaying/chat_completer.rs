//! Replaying adapter for the `ChatCompleter` port.

use super::{next_output, replay_result, SharedReplayer};
use crate::ports::chat_completer::{ChatCompleter, ChatRequest, ChatResponse, CompleteFuture};

/// Serves recorded completions.
pub struct ReplayingChatCompleter {
    replayer: SharedReplayer,
}

impl ReplayingChatCompleter {
    /// Create a completer backed by the given replayer.
    #[must_use]
    pub fn new(replayer: SharedReplayer) -> Self {
        Self { replayer }
    }
}

impl ChatCompleter for ReplayingChatCompleter {
    fn complete(&self, _request: &ChatRequest) -> CompleteFuture<'_> {
        let output = next_output(&self.replayer, "chat_completer", "complete");
        Box::pin(async move { replay_result::<ChatResponse>(output) })
    }
}
