//! Recording adapter for the `ImageGenerator` port.

use std::sync::Arc;

use super::{record_result, SharedRecorder};
use crate::ports::image_generator::{ImageGenerator, PredictionRequest, RunFuture};

/// Records predictions while delegating to an inner implementation.
pub struct RecordingImageGenerator {
    inner: Box<dyn ImageGenerator>,
    recorder: SharedRecorder,
}

impl RecordingImageGenerator {
    /// Wrap `inner`, recording into `recorder`.
    pub fn new(inner: Box<dyn ImageGenerator>, recorder: SharedRecorder) -> Self {
        Self { inner, recorder }
    }
}

impl ImageGenerator for RecordingImageGenerator {
    fn run(&self, request: &PredictionRequest) -> RunFuture<'_> {
        let request = request.clone();
        let recorder = Arc::clone(&self.recorder);

        Box::pin(async move {
            let result = self.inner.run(&request).await;
            record_result(&recorder, "image_generator", "run", &request, &result);
            result
        })
    }
}
