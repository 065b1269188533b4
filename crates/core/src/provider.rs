//! Provider traits: the abstraction over model backends.
//!
//! A [`Provider`] sends a chat plus function definitions to a language
//! model and gets back either plain text or a function-call request.
//! An [`EmbeddingBackend`] performs exactly one embedding request; the
//! batching and retry policy around it lives in the memory crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::function::{FunctionCall, FunctionDefinition};
use crate::message::Message;

/// Configuration for a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// The chat, in the order it should be shown to the model
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Functions the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDefinition>,
}

fn default_temperature() -> f32 {
    0.0
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl ProviderResponse {
    /// Classify the reply for the function loop.
    pub fn into_reply(self) -> ModelReply {
        match self.message.function_call {
            Some(call) => ModelReply::FunctionCall(call),
            None => ModelReply::Message(self.message.content),
        }
    }
}

/// Either plain text or a request to call a function.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Message(String),
    FunctionCall(FunctionCall),
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single embedding request (one batch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings (e.g., "text-embedding-ada-002").
    pub model: String,

    /// The texts to embed.
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vectors, one per input text, in input order.
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used.
    pub model: String,

    /// Token usage.
    pub usage: Option<Usage>,
}

/// The completion backend the function loop talks to.
///
/// Rate limiting and generic service failures surface as distinct
/// [`ProviderError`] variants so callers can tell them apart.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;
}

/// A backend able to embed one batch of texts in one network round trip.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, request: EmbeddingRequest) -> std::result::Result<EmbeddingResponse, ProviderError>;
}
