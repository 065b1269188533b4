//! Shared test helpers for loop and agent tests.

use async_trait::async_trait;
use goalclaw_core::embedding::{Embedding, EmbeddingApi};
use goalclaw_core::error::{EmbeddingError, ProviderError};
use goalclaw_core::function::FunctionCall;
use goalclaw_core::message::Message;
use goalclaw_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("SequentialMockProvider: no more responses (call #{count})");
        }
        responses.remove(0)
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A plain text reply.
pub fn text(content: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(content),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A reply that calls `name` with `args`.
pub fn call(name: &str, args: serde_json::Value) -> ProviderResponse {
    ProviderResponse {
        message: Message::function_call(FunctionCall::new(name, args.to_string())),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Embeds text as counts of a few fixed keywords.
pub struct KeywordEmbedder;

pub const KEYWORDS: [&str; 5] = ["code", "research", "data", "web", "file"];

#[async_trait]
impl EmbeddingApi for KeywordEmbedder {
    async fn create_embeddings(&self, inputs: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let lower = input.to_lowercase();
                Embedding {
                    embedding: KEYWORDS.iter().map(|k| lower.matches(k).count() as f32 + 0.01).collect(),
                    index,
                }
            })
            .collect())
    }
}
