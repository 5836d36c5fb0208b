//! Recording adapter for the `ChatCompleter` port.

use std::sync::Arc;

use super::{record_result, SharedRecorder};
use crate::ports::chat_completer::{ChatCompleter, ChatRequest, CompleteFuture};

/// Records completions while delegating to an inner implementation.
pub struct RecordingChatCompleter {
    inner: Box<dyn ChatCompleter>,
    recorder: SharedRecorder,
}

impl RecordingChatCompleter {
    /// Wrap `inner`, recording into `recorder`.
    pub fn new(inner: Box<dyn ChatCompleter>, recorder: SharedRecorder) -> Self {
        Self { inner, recorder }
    }
}

impl ChatCompleter for RecordingChatCompleter {
    fn complete(&self, request: &ChatRequest) -> CompleteFuture<'_> {
        let request = request.clone();
        let recorder = Arc::clone(&self.recorder);

        Box::pin(async move {
            let result = self.inner.complete(&request).await;
            record_result(&recorder, "chat_completer", "complete", &request, &result);
            result
        })
    }
}
