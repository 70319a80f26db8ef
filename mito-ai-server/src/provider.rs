//! Upstream completion client seam.
//!
//! [`CompletionService`](crate::completion::CompletionService) talks to the
//! model through [`CompletionClient`]. Implementations: [`OpenAiClient`](crate::llm::OpenAiClient)
//! (own API key, streams), [`MitoServerClient`](crate::mito_server::MitoServerClient)
//! (metered proxy, no streaming) and the scripted `MockCompletionClient` for tests.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use mito_ai_shared::ChatMessage;

use crate::error::ProviderError;

/// Which credential pays for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// The user's own OpenAI key.
    UserKey,
    /// Metered usage through the Mito server.
    MitoServer,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::UserKey => "user",
            KeyType::MitoServer => "mito_server",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Choice {
    pub content: Option<String>,
}

/// Result of a non-streaming call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub choices: Vec<Choice>,
    /// Metered usage count after this call, when the provider tracks one.
    pub num_usages: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaChoice {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
}

/// One incremental upstream event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    pub choices: Vec<DeltaChoice>,
}

pub type DeltaStream = BoxStream<'static, Result<StreamDelta, ProviderError>>;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Human name used in error titles.
    fn name(&self) -> &'static str;

    fn key_type(&self) -> KeyType;

    /// Callers only request a stream when this is true.
    fn can_stream(&self) -> bool;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, ProviderError>;

    /// Opens the upstream stream. An `Err` here means nothing was streamed.
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError>;
}
