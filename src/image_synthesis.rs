//! Image synthesis: run the tattoo model on Replicate and collect output URLs.

use serde_json::json;

use crate::config::FallbackKeys;
use crate::error::{ProviderFailure, Stage, TatttyError};
use crate::model::ModelRef;
use crate::output::normalize;
use crate::params::{build_input, validate_aspect_ratio, validate_format, validate_megapixels};
use crate::ports::image_generator::PredictionRequest;
use crate::ports::ImageGenerator;
use crate::request_log::{LogSource, LogType, NewLogEntry, RequestLog};
use crate::settings::Settings;

/// Model and token resolved from settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTarget {
    /// Parsed `owner/name[:version]` reference.
    pub model: ModelRef,
    /// Replicate token from settings or the environment.
    pub api_token: String,
}

/// Resolve the model reference and token without touching the network.
///
/// # Errors
///
/// Returns [`TatttyError::MissingCredential`] when the token or model is
/// absent, [`TatttyError::InvalidArgument`] for a malformed model reference.
pub fn resolve_image_target(
    settings: &Settings,
    fallback: &FallbackKeys,
) -> Result<ImageTarget, TatttyError> {
    let api_token = settings
        .providers
        .replicate
        .usable_key()
        .map(ToString::to_string)
        .or_else(|| fallback.replicate.clone())
        .ok_or_else(|| TatttyError::MissingCredential("Replicate API token is missing".into()))?;

    let reference = settings.tattty.generation_model.trim();
    if reference.is_empty() {
        return Err(TatttyError::MissingCredential(
            "Image generation model is not configured".into(),
        ));
    }
    let model = ModelRef::parse(reference).map_err(TatttyError::InvalidArgument)?;

    Ok(ImageTarget { model, api_token })
}

/// Generate images for `prompt` and return their URLs in provider order.
///
/// # Errors
///
/// Configuration errors come back unchanged before any network call;
/// provider failures come back classified.
pub async fn synthesize_image(
    images: &dyn ImageGenerator,
    settings: &Settings,
    fallback: &FallbackKeys,
    log: &RequestLog,
    prompt: &str,
    aspect_ratio: &str,
    request_id: &str,
) -> Result<Vec<String>, TatttyError> {
    let result =
        run_prediction(images, settings, fallback, log, prompt, aspect_ratio, request_id).await;
    match result {
        Ok(urls) => {
            let remote: Vec<&String> = urls.iter().filter(|u| !u.starts_with("data:")).collect();
            log.write(
                entry(request_id, LogType::Image, "Images generated")
                    .with_details(json!({ "count": urls.len(), "urls": remote })),
            )
            .await;
            Ok(urls)
        }
        Err(e) => {
            let err = match e {
                TatttyError::MissingCredential(_)
                | TatttyError::InvalidArgument(_)
                | TatttyError::NoOutput(_)
                | TatttyError::Timeout { .. } => e,
                other => TatttyError::Provider(ProviderFailure::classify(Stage::Image, &other)),
            };
            log.write(entry(request_id, LogType::Error, err.to_string())).await;
            Err(err)
        }
    }
}

async fn run_prediction(
    images: &dyn ImageGenerator,
    settings: &Settings,
    fallback: &FallbackKeys,
    log: &RequestLog,
    prompt: &str,
    aspect_ratio: &str,
    request_id: &str,
) -> Result<Vec<String>, TatttyError> {
    let target = resolve_image_target(settings, fallback)?;
    let section = &settings.tattty;

    let input = build_input(section, prompt, aspect_ratio);
    let effective_ratio = input.get("aspect_ratio").and_then(|v| v.as_str()).unwrap_or_default();
    validate_aspect_ratio(effective_ratio).map_err(TatttyError::InvalidArgument)?;
    validate_format(&section.output_format).map_err(TatttyError::InvalidArgument)?;
    validate_megapixels(&section.megapixels).map_err(TatttyError::InvalidArgument)?;

    log.write(
        entry(request_id, LogType::Info, "Starting image generation")
            .with_details(json!({ "model": target.model.to_string(), "input": input })),
    )
    .await;

    let request = PredictionRequest {
        model: target.model,
        input,
        api_token: target.api_token,
        inline_output: section.inline_output,
    };
    let output = images.run(&request).await?;
    tracing::debug!(request_id, ?output, "raw prediction output");
    normalize(output)
}

fn entry(request_id: &str, kind: LogType, message: impl Into<String>) -> NewLogEntry {
    NewLogEntry::new(request_id, kind, LogSource::Replicate, message)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::ports::image_generator::{OutputItem, RawOutput, RunFuture};

    /// Image generator double that counts calls and remembers the last request.
    pub(crate) struct FakeImages {
        calls: AtomicUsize,
        pub last: Mutex<Option<PredictionRequest>>,
        reply: Result<RawOutput, (u16, String)>,
    }

    impl FakeImages {
        pub(crate) fn returning(output: RawOutput) -> Self {
            Self { calls: AtomicUsize::new(0), last: Mutex::new(None), reply: Ok(output) }
        }

        pub(crate) fn failing(status: u16, message: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
                reply: Err((status, message.into())),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ImageGenerator for FakeImages {
        fn run(&self, request: &PredictionRequest) -> RunFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            let reply = self.reply.clone();
            Box::pin(async move {
                reply.map_err(|(status, message)| TatttyError::Api { status, message })
            })
        }
    }

    pub(crate) fn replicate_settings() -> Settings {
        let mut settings = Settings::default();
        settings.providers.replicate.api_key = "r8_test".into();
        settings.providers.replicate.enabled = true;
        settings
    }

    fn log() -> (tempfile::TempDir, RequestLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = RequestLog::new(dir.path().join("logs.json"));
        (dir, log)
    }

    #[tokio::test]
    async fn missing_token_makes_no_call() {
        let (_dir, log) = log();
        let images = FakeImages::returning(RawOutput::Empty);

        let err = synthesize_image(
            &images,
            &Settings::default(),
            &FallbackKeys::default(),
            &log,
            "a koi",
            "1:1",
            "req1",
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Replicate API token is missing");
        assert_eq!(images.calls(), 0);
    }

    #[test]
    fn missing_model() {
        let mut settings = replicate_settings();
        settings.tattty.generation_model = String::new();
        let err = resolve_image_target(&settings, &FallbackKeys::default()).unwrap_err();
        assert_eq!(err.to_string(), "Image generation model is not configured");
    }

    #[tokio::test]
    async fn success_returns_urls_and_sends_suffixed_prompt() {
        let (_dir, log) = log();
        let images = FakeImages::returning(RawOutput::Many(vec![
            OutputItem::Url("https://replicate.delivery/1.webp".into()),
            OutputItem::File { url: "https://replicate.delivery/2.webp".into() },
        ]));

        let urls = synthesize_image(
            &images,
            &replicate_settings(),
            &FallbackKeys::default(),
            &log,
            "a koi",
            "4:3",
            "req2",
        )
        .await
        .unwrap();

        assert_eq!(
            urls,
            vec!["https://replicate.delivery/1.webp", "https://replicate.delivery/2.webp"]
        );
        let sent = images.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.input["prompt"], "a koi, white background");
        assert_eq!(sent.input["aspect_ratio"], "4:3");
        assert_eq!(sent.api_token, "r8_test");
        assert_eq!(log.entries_for("req2").await[0].kind, LogType::Image);
    }

    #[tokio::test]
    async fn rate_limit_text_is_classified() {
        let (_dir, log) = log();
        let images = FakeImages::failing(500, "Request failed with status 429 Too Many Requests");

        let err = synthesize_image(
            &images,
            &replicate_settings(),
            &FallbackKeys::default(),
            &log,
            "a koi",
            "1:1",
            "req3",
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "🚨 RATE LIMIT EXCEEDED! Try again later.");
    }

    #[tokio::test]
    async fn empty_output_is_shape_error() {
        let (_dir, log) = log();
        let images = FakeImages::returning(RawOutput::Empty);

        let err = synthesize_image(
            &images,
            &replicate_settings(),
            &FallbackKeys::default(),
            &log,
            "a koi",
            "1:1",
            "req4",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TatttyError::NoOutput(_)));
    }

    #[tokio::test]
    async fn invalid_aspect_ratio_is_rejected_before_call() {
        let (_dir, log) = log();
        let images = FakeImages::returning(RawOutput::Empty);

        let err = synthesize_image(
            &images,
            &replicate_settings(),
            &FallbackKeys::default(),
            &log,
            "a koi",
            "7:5",
            "req5",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TatttyError::InvalidArgument(_)));
        assert_eq!(images.calls(), 0);
    }
}
