//! Live adapter for `OpenAI`-compatible and Ollama chat-completion APIs.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::TatttyError;
use crate::model::LlmProvider;
use crate::ports::chat_completer::{ChatCompleter, ChatRequest, ChatResponse, CompleteFuture};

/// Default `OpenAI` host.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Live chat completer speaking both wire dialects.
pub struct HttpChatCompleter {
    client: Client,
}

impl HttpChatCompleter {
    /// Create a completer with its own connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for HttpChatCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatCompleter for HttpChatCompleter {
    fn complete(&self, request: &ChatRequest) -> CompleteFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let base = request.base_url.trim_end_matches('/');
            let url = match request.provider {
                LlmProvider::OpenAi => format!("{base}/v1/chat/completions"),
                LlmProvider::Ollama => format!("{base}/api/chat"),
            };
            let body = json!({
                "model": request.model,
                "messages": request.messages,
                "stream": false,
            });

            let mut builder = self.client.post(&url).json(&body);
            if let Some(key) = request.api_key.as_deref().filter(|k| !k.is_empty()) {
                builder = builder.bearer_auth(key);
            }
            let response = builder.send().await?;

            let status = response.status();
            let response_text = response.text().await?;
            if !status.is_success() {
                return Err(TatttyError::Api { status: status.as_u16(), message: response_text });
            }

            let content = match request.provider {
                LlmProvider::OpenAi => {
                    let parsed: OpenAiChatResponse = parse(&response_text)?;
                    parsed.choices.into_iter().next().map(|c| c.message.content)
                }
                LlmProvider::Ollama => {
                    let parsed: OllamaChatResponse = parse(&response_text)?;
                    Some(parsed.message.content)
                }
            };

            let content = content.map(|c| c.trim().to_string()).unwrap_or_default();
            if content.is_empty() {
                return Err(TatttyError::Api {
                    status: status.as_u16(),
                    message: "Empty completion in response".into(),
                });
            }
            Ok(ChatResponse { content })
        })
    }
}

fn parse<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, TatttyError> {
    serde_json::from_str(text).map_err(|e| TatttyError::Api {
        status: 200,
        message: format!("Failed to parse response: {e}"),
    })
}

// --- Wire response types ---

#[derive(Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::ports::chat_completer::ChatMessage;

    fn request(provider: LlmProvider, base_url: String, api_key: Option<&str>) -> ChatRequest {
        ChatRequest {
            provider,
            base_url,
            api_key: api_key.map(ToString::to_string),
            model: "gpt-4o".into(),
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("Input:\nStyle: Koi.")],
        }
    }

    #[tokio::test]
    async fn openai_dialect() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test");
            then.status(200).header("content-type", "application/json").json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": "  a koi in ink \n" } }]
            }));
        });

        let completer = HttpChatCompleter::new();
        let response = completer
            .complete(&request(LlmProvider::OpenAi, server.base_url(), Some("sk-test")))
            .await
            .unwrap();

        assert_eq!(response.content, "a koi in ink");
        mock.assert();
    }

    #[tokio::test]
    async fn ollama_dialect_without_key() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(200).json_body(json!({ "message": { "content": "lotus linework" } }));
        });

        let completer = HttpChatCompleter::new();
        let req = request(LlmProvider::Ollama, server.base_url(), None);
        let response = completer.complete(&req).await.unwrap();

        assert_eq!(response.content, "lotus linework");
        mock.assert();
    }

    #[tokio::test]
    async fn error_status_is_structured() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401).body("Incorrect API key provided");
        });

        let completer = HttpChatCompleter::new();
        let err = completer
            .complete(&request(LlmProvider::OpenAi, server.base_url(), Some("bad")))
            .await
            .unwrap_err();

        assert!(matches!(err, TatttyError::Api { status: 401, .. }));
    }
}
