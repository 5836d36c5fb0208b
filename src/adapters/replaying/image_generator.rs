//! Replaying adapter for the `ImageGenerator` port.

use super::{next_output, replay_result, SharedReplayer};
use crate::ports::image_generator::{ImageGenerator, PredictionRequest, RawOutput, RunFuture};

/// Serves recorded prediction outputs.
pub struct ReplayingImageGenerator {
    replayer: SharedReplayer,
}

impl ReplayingImageGenerator {
    /// Create a generator backed by the given replayer.
    #[must_use]
    pub fn new(replayer: SharedReplayer) -> Self {
        Self { replayer }
    }
}

impl ImageGenerator for ReplayingImageGenerator {
    fn run(&self, _request: &PredictionRequest) -> RunFuture<'_> {
        let output = next_output(&self.replayer, "image_generator", "run");
        Box::pin(async move { replay_result::<RawOutput>(output) })
    }
}
