//! Provider-facing types and clients.
//!
//! This module holds everything that talks to the OpenAI-compatible
//! provider: the wire types for chat messages, the path-forwarding
//! [`CompletionProxy`], the [`Embedder`] built on top of it, and the
//! [`relay`] that turns a provider event stream back into plain text.
//!
//! # Modules
//!
//! - [`upstream`]: base URL and credential resolution
//! - [`proxy`]: path-forwarding completion proxy
//! - [`embedding`]: embedding client
//! - [`sse`]: incremental event-stream parser
//! - [`relay`]: provider stream to caller byte stream

pub mod embedding;
pub mod proxy;
pub mod relay;
pub mod sse;
pub mod upstream;

pub use embedding::{Embedder, OpenAiEmbedder};
pub use proxy::{CompletionProxy, ProxyRequest};
pub use upstream::{ApiCredential, UpstreamSettings};

use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content of the message.
    pub content: String,
    /// Display date attached by the chat client or by the chain builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl Message {
    /// Create a message without a date.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            date: None,
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Attach a date.
    #[must_use]
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }
}

/// A chat completion request as sent by the chat client.
///
/// Only `messages` is interpreted; every other model parameter is kept in
/// `params` and forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Conversation in chronological order.
    pub messages: Vec<Message>,
    /// Model parameters (`model`, `temperature`, `stream`, ...).
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ChatCompletionRequest {
    /// Drop client-side fields the provider does not accept.
    #[must_use]
    pub fn into_upstream(mut self) -> Self {
        for message in &mut self.messages {
            message.date = None;
        }
        self
    }
}
