//! Chat completion providers

pub mod openai;
pub mod sse;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub use openai::OpenAiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered with an error status
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Provider request failed: {0}")]
    Transport(String),
    #[error("Unexpected provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// Text fragments in provider order. Finite and not restartable.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Wait for the whole assistant reply
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;

    /// Open a token stream. Errors before the first byte are returned here;
    /// later ones arrive as stream items.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError>;
}
