//! Styled text variants for lettering tattoos.

use std::time::Duration;

use crate::adapters::live::chat::OPENAI_BASE_URL;
use crate::config::FallbackKeys;
use crate::error::TatttyError;
use crate::model::LlmProvider;
use crate::ports::chat_completer::{ChatMessage, ChatRequest};
use crate::ports::ChatCompleter;
use crate::settings::Settings;

/// Model used for font variants.
pub const FONT_MODEL: &str = "gpt-4o-mini";
/// Upper bound on a font request.
pub const FONT_TIMEOUT: Duration = Duration::from_secs(30);
/// Variants returned at most.
pub const MAX_VARIANTS: usize = 5;

/// Message shown for any failure other than a missing text.
pub const FONT_FAILURE: &str = "Failed to generate fonts. Please try again later.";

fn font_prompt(text: &str, style: Option<&str>) -> String {
    let style = match style.map(str::trim).filter(|s| !s.is_empty()) {
        Some(style) => format!("in a {style} style"),
        None => "in various creative and artistic styles".to_string(),
    };
    format!(
        "Generate 5 creative font variations of the following text {style}.\n\
         Each variation should use different Unicode characters, symbols, or styling \
         to create visually distinct versions.\n\
         Return only the styled text variations, one per line, \
         without numbering or additional explanation.\n\
         \n\
         Original text: \"{text}\""
    )
}

/// Up to five non-blank lines of the reply; the original text when none.
#[must_use]
pub fn parse_variants(reply: &str, text: &str) -> Vec<String> {
    let fonts: Vec<String> = reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(MAX_VARIANTS)
        .map(ToString::to_string)
        .collect();
    if fonts.is_empty() {
        vec![text.to_string()]
    } else {
        fonts
    }
}

/// Ask the chat model for styled variants of `text`.
///
/// # Errors
///
/// Returns [`TatttyError::Validation`] for a blank text,
/// [`TatttyError::MissingCredential`] without an OpenAI key, and the
/// provider error or a 504 [`TatttyError::Api`] when the call fails or
/// runs past [`FONT_TIMEOUT`].
pub async fn generate_fonts(
    chat: &dyn ChatCompleter,
    settings: &Settings,
    fallback: &FallbackKeys,
    text: &str,
    style: Option<&str>,
    timeout: Duration,
) -> Result<Vec<String>, TatttyError> {
    if text.trim().is_empty() {
        return Err(TatttyError::Validation("Text is required".into()));
    }
    let api_key = settings
        .providers
        .openai
        .usable_key()
        .map(ToString::to_string)
        .or_else(|| fallback.openai.clone())
        .ok_or_else(|| TatttyError::MissingCredential("OpenAI API key is missing".into()))?;

    let request = ChatRequest {
        provider: LlmProvider::OpenAi,
        base_url: OPENAI_BASE_URL.to_string(),
        api_key: Some(api_key),
        model: FONT_MODEL.to_string(),
        messages: vec![ChatMessage::user(font_prompt(text, style))],
    };

    let started = std::time::Instant::now();
    let response = tokio::time::timeout(timeout, chat.complete(&request))
        .await
        .map_err(|_| TatttyError::Api { status: 504, message: "Timeout".into() })??;
    tracing::info!(elapsed_ms = started.elapsed().as_millis(), "font generation completed");

    Ok(parse_variants(&response.content, text))
}
