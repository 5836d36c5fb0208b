//! Unified error type for tattty.

use std::fmt;

use thiserror::Error;

/// Errors that can occur anywhere in the generation pipeline.
#[derive(Debug, Error)]
pub enum TatttyError {
    /// An API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// A network error occurred.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON payload could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Form input rejected before any request was issued.
    #[error("{0}")]
    Validation(String),

    /// A key, provider or model is absent; detected before any network call.
    #[error("{0}")]
    MissingCredential(String),

    /// A classified provider failure with a user-facing message.
    #[error("{0}")]
    Provider(ProviderFailure),

    /// A prediction reached a terminal non-success state.
    #[error("Prediction {status}: {message}")]
    PredictionFailed {
        /// Terminal status reported by the provider (`failed` or `canceled`).
        status: String,
        /// Provider error text, if any.
        message: String,
    },

    /// The provider answered but produced nothing usable.
    #[error("🚨 NO IMAGE GENERATED! {0}")]
    NoOutput(String),

    /// The prediction never reached a terminal state in time.
    #[error("🚨 GENERATION TIMED OUT after {attempts} status checks ({elapsed_secs}s).")]
    Timeout {
        /// Number of status checks performed.
        attempts: u32,
        /// Seconds spent waiting.
        elapsed_secs: u64,
    },

    /// A generation is already running for this form.
    #[error("A generation is already in progress.")]
    Busy,

    /// An upload was aborted by the caller.
    #[error("Upload cancelled")]
    Cancelled,

    /// An error served from a cassette.
    #[error("{0}")]
    Replayed(String),
}

/// Pipeline stage a provider failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Chat-completion prompt synthesis.
    Prompt,
    /// Replicate image synthesis.
    Image,
}

/// Bucket a provider failure is sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Invalid or rejected credentials.
    Auth,
    /// Provider throttled the request.
    RateLimit,
    /// Model missing or unavailable.
    ModelUnavailable,
    /// Anything else.
    Other,
}

/// A provider error mapped to a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Stage that failed.
    pub stage: Stage,
    /// Failure bucket.
    pub kind: FailureKind,
    /// Raw error text, embedded in the generic message.
    pub detail: String,
}

impl ProviderFailure {
    /// Classify an error raised while talking to a provider.
    ///
    /// A structured HTTP status wins; the error text is only inspected
    /// when the status says nothing specific.
    #[must_use]
    pub fn classify(stage: Stage, err: &TatttyError) -> Self {
        let detail = err.to_string();
        let kind = match err {
            TatttyError::Api { status, .. } => {
                kind_from_status(*status).unwrap_or_else(|| kind_from_text(&detail))
            }
            TatttyError::Network(e) => e
                .status()
                .and_then(|s| kind_from_status(s.as_u16()))
                .unwrap_or_else(|| kind_from_text(&detail)),
            _ => kind_from_text(&detail),
        };
        Self { stage, kind, detail }
    }
}

fn kind_from_status(status: u16) -> Option<FailureKind> {
    match status {
        401 | 403 => Some(FailureKind::Auth),
        429 => Some(FailureKind::RateLimit),
        404 => Some(FailureKind::ModelUnavailable),
        _ => None,
    }
}

fn kind_from_text(text: &str) -> FailureKind {
    let lower = text.to_lowercase();
    if lower.contains("401") || lower.contains("api key") || lower.contains("api token") {
        FailureKind::Auth
    } else if lower.contains("429") || lower.contains("rate limit") {
        FailureKind::RateLimit
    } else if lower.contains("404") || lower.contains("model") {
        FailureKind::ModelUnavailable
    } else {
        FailureKind::Other
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.stage, self.kind) {
            (_, FailureKind::RateLimit) => f.write_str("🚨 RATE LIMIT EXCEEDED! Try again later."),
            (Stage::Prompt, FailureKind::Auth) => {
                f.write_str("🚨 LLM API KEY INVALID! Check the provider key in settings.")
            }
            (Stage::Prompt, FailureKind::ModelUnavailable) => {
                f.write_str("🚨 LLM MODEL NOT FOUND! Check the configured model name.")
            }
            (Stage::Prompt, FailureKind::Other) => {
                write!(f, "🚨 PROMPT SYNTHESIS FAILED: {}", self.detail)
            }
            (Stage::Image, FailureKind::Auth) => f.write_str(
                "🚨 REPLICATE API TOKEN INVALID! \
                 Check the Replicate key in settings or REPLICATE_API_TOKEN.",
            ),
            (Stage::Image, FailureKind::ModelUnavailable) => {
                f.write_str("🚨 TATTTY MODEL UNAVAILABLE! Check Replicate for model status.")
            }
            (Stage::Image, FailureKind::Other) => write!(
                f,
                "🚨 TATTTY GENERATION FAILED: {}. Check API token and model.",
                self.detail
            ),
        }
    }
}
