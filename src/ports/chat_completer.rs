//! Chat-completion port used for prompt synthesis and font variants.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::TatttyError;
use crate::model::LlmProvider;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Operator instructions.
    System,
    /// End-user content.
    User,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// A single non-streaming completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Wire dialect to speak.
    pub provider: LlmProvider,
    /// Provider host, without a trailing slash.
    pub base_url: String,
    /// Bearer key; never written to cassettes.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Conversation, system message first.
    pub messages: Vec<ChatMessage>,
}

/// The assistant's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Reply text, trimmed.
    pub content: String,
}

/// Boxed future type returned by [`ChatCompleter::complete`].
pub type CompleteFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ChatResponse, TatttyError>> + Send + 'a>>;

/// Sends a conversation to a chat-completion endpoint.
pub trait ChatCompleter: Send + Sync {
    /// Complete the conversation once, without retries.
    fn complete(&self, request: &ChatRequest) -> CompleteFuture<'_>;
}
