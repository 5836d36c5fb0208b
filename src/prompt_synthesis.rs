//! Prompt synthesis: turn the form answers into one image prompt via an LLM.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapters::live::chat::OPENAI_BASE_URL;
use crate::config::{ollama_base_url, FallbackKeys};
use crate::error::{ProviderFailure, Stage, TatttyError};
use crate::model::LlmProvider;
use crate::ports::chat_completer::{ChatMessage, ChatRequest};
use crate::ports::ChatCompleter;
use crate::request_log::{LogSource, LogType, NewLogEntry, RequestLog};
use crate::settings::Settings;

/// Everything the user chose or wrote on the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TattooBrief {
    /// Style label, e.g. `Watercolor`.
    pub style: String,
    /// Body placement.
    pub placement: String,
    /// Palette label.
    pub color: String,
    /// Mood or theme.
    pub mood: String,
    /// Ratio such as `3:4`.
    pub aspect_ratio: String,
    /// Answer to the first personal question.
    pub q1_answer: String,
    /// Answer to the second personal question.
    pub q2_answer: String,
    /// Question text shown to the user; settings supply it when absent.
    pub q1_question: Option<String>,
    /// Same as `q1_question`, for the second question.
    pub q2_question: Option<String>,
}

/// Chat endpoint, model and key resolved from settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmTarget {
    /// Selected provider.
    pub provider: LlmProvider,
    /// Endpoint root without a trailing slash.
    pub base_url: String,
    /// `None` for providers that take no key (Ollama).
    pub api_key: Option<String>,
    /// Model name sent with the request.
    pub model: String,
}

/// Resolve the LLM target. Nothing here touches the network.
///
/// # Errors
///
/// Returns [`TatttyError::MissingCredential`] when the provider, the model,
/// or a required key is absent.
pub fn resolve_llm(settings: &Settings, fallback: &FallbackKeys) -> Result<LlmTarget, TatttyError> {
    let section = &settings.tattty;

    let provider_name = non_blank(section.llm_provider.as_deref())
        .ok_or_else(|| TatttyError::MissingCredential("LLM provider is not configured".into()))?;
    let provider = LlmProvider::parse(provider_name).map_err(TatttyError::MissingCredential)?;

    let model = non_blank(section.llm_model.as_deref())
        .ok_or_else(|| TatttyError::MissingCredential("LLM model is not configured".into()))?
        .to_string();

    let api_key = match provider {
        LlmProvider::OpenAi => settings
            .providers
            .openai
            .usable_key()
            .map(ToString::to_string)
            .or_else(|| fallback.openai.clone()),
        LlmProvider::Ollama => None,
    };
    if provider.requires_api_key() && api_key.is_none() {
        return Err(TatttyError::MissingCredential(format!(
            "{} API key is missing",
            provider.display_name()
        )));
    }

    let base_url = match non_blank(section.llm_base_url.as_deref()) {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => match provider {
            LlmProvider::OpenAi => OPENAI_BASE_URL.to_string(),
            LlmProvider::Ollama => ollama_base_url(),
        },
    };

    Ok(LlmTarget { provider, base_url, api_key, model })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// The fixed "Input:" block sent as the user message.
#[must_use]
pub fn user_message(brief: &TattooBrief, settings: &Settings) -> String {
    let question = |given: Option<&str>, index: usize| -> String {
        non_blank(given)
            .map(ToString::to_string)
            .or_else(|| settings.tattty.questions.get(index).map(|q| q.question.clone()))
            .unwrap_or_else(|| format!("Question {}", index + 1))
    };
    let q1 = question(brief.q1_question.as_deref(), 0);
    let q2 = question(brief.q2_question.as_deref(), 1);

    format!(
        "Input:\n\
         Style: {}.\n\
         Placement: {}.\n\
         Theme: {}.\n\
         Question 1: {q1} Answer 1: {}.\n\
         Question 2: {q2} Answer 2: {}.\n\
         Palette: {}.\n\
         Aspect Ratio: {}.",
        brief.style.trim(),
        brief.placement.trim(),
        brief.mood.trim(),
        brief.q1_answer.trim(),
        brief.q2_answer.trim(),
        brief.color.trim(),
        brief.aspect_ratio.trim(),
    )
}

/// Synthesize the image prompt. One call, no retries.
///
/// # Errors
///
/// Returns the missing-configuration error before any network call, or a
/// classified [`TatttyError::Provider`] failure.
pub async fn synthesize_prompt(
    chat: &dyn ChatCompleter,
    settings: &Settings,
    fallback: &FallbackKeys,
    log: &RequestLog,
    brief: &TattooBrief,
    request_id: &str,
) -> Result<String, TatttyError> {
    let target = match resolve_llm(settings, fallback) {
        Ok(target) => target,
        Err(e) => {
            log.write(entry(request_id, LogType::Error, e.to_string())).await;
            return Err(e);
        }
    };

    log.write(
        entry(request_id, LogType::Info, "Synthesizing prompt")
            .with_details(json!({
                "provider": target.provider,
                "model": target.model,
                "style": brief.style,
                "placement": brief.placement,
            })),
    )
    .await;

    let request = ChatRequest {
        provider: target.provider,
        base_url: target.base_url,
        api_key: target.api_key,
        model: target.model,
        messages: vec![
            ChatMessage::system(settings.system_prompt()),
            ChatMessage::user(user_message(brief, settings)),
        ],
    };

    match chat.complete(&request).await {
        Ok(response) => {
            let prompt = response.content.trim().to_string();
            if prompt.is_empty() {
                let err = TatttyError::Provider(ProviderFailure::classify(
                    Stage::Prompt,
                    &TatttyError::Api { status: 200, message: "Empty completion".into() },
                ));
                log.write(entry(request_id, LogType::Error, err.to_string())).await;
                return Err(err);
            }
            log.write(
                entry(request_id, LogType::Prompt, "Prompt synthesized")
                    .with_details(json!({ "prompt": prompt })),
            )
            .await;
            Ok(prompt)
        }
        Err(e) => {
            let failure = ProviderFailure::classify(Stage::Prompt, &e);
            log.write(
                entry(request_id, LogType::Error, failure.to_string())
                    .with_details(json!({ "error": e.to_string() })),
            )
            .await;
            Err(TatttyError::Provider(failure))
        }
    }
}

fn entry(request_id: &str, kind: LogType, message: impl Into<String>) -> NewLogEntry {
    NewLogEntry::new(request_id, kind, LogSource::Baddie, message)
}
