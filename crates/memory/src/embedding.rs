//! Embedding client: local validation, batching and retry around an
//! `EmbeddingBackend`.
//!
//! Policy per batch:
//! - bad request: fail at once
//! - rate limited: wait a fixed delay and retry, up to `max_attempts` total
//! - quota exhausted: call the cap-reached callback and fail, never retried
//! - anything else: opaque service error carrying the upstream message
//!
//! Inputs longer than the per-input token maximum fail before any request
//! is sent.

use async_trait::async_trait;
use goalclaw_core::embedding::{Embedding, EmbeddingApi};
use goalclaw_core::error::{EmbeddingError, ProviderError};
use goalclaw_core::provider::{EmbeddingBackend, EmbeddingRequest};
use goalclaw_core::tokenizer::Tokenizer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Called once each time the service reports that the usage cap is reached.
pub type CapReachedCallback = Arc<dyn Fn() + Send + Sync>;

pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    tokenizer: Arc<dyn Tokenizer>,
    model: String,
    max_tokens_per_input: usize,
    max_inputs_per_request: usize,
    retry_delay: Duration,
    max_attempts: u32,
    on_cap_reached: Option<CapReachedCallback>,
}

impl EmbeddingClient {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            backend,
            tokenizer,
            model: "text-embedding-ada-002".into(),
            max_tokens_per_input: 8191,
            max_inputs_per_request: 2048,
            retry_delay: Duration::from_secs(15),
            max_attempts: 5,
            on_cap_reached: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens_per_input(mut self, max: usize) -> Self {
        self.max_tokens_per_input = max;
        self
    }

    /// Largest batch sent in one request. Values below 1 are treated as 1.
    pub fn with_max_inputs_per_request(mut self, max: usize) -> Self {
        self.max_inputs_per_request = max.max(1);
        self
    }

    /// Delay between rate-limited attempts and the total attempt bound.
    pub fn with_retry(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.retry_delay = delay;
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn on_cap_reached(mut self, callback: CapReachedCallback) -> Self {
        self.on_cap_reached = Some(callback);
        self
    }

    fn validate(&self, inputs: &[String]) -> Result<(), EmbeddingError> {
        for (index, input) in inputs.iter().enumerate() {
            let tokens = self.tokenizer.count(input);
            if tokens > self.max_tokens_per_input {
                return Err(EmbeddingError::InputTooLong {
                    index,
                    tokens,
                    max: self.max_tokens_per_input,
                });
            }
        }
        Ok(())
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut attempt = 1;
        loop {
            let request = EmbeddingRequest {
                model: self.model.clone(),
                inputs: batch.to_vec(),
            };

            match self.backend.embed(request).await {
                Ok(response) => {
                    if response.embeddings.len() != batch.len() {
                        return Err(EmbeddingError::Mismatch {
                            expected: batch.len(),
                            got: response.embeddings.len(),
                        });
                    }
                    return Ok(response.embeddings);
                }
                Err(ProviderError::RateLimited { .. }) => {
                    if attempt >= self.max_attempts {
                        warn!(attempts = attempt, "Embedding request still rate limited, giving up");
                        return Err(EmbeddingError::RateLimited { attempts: attempt });
                    }
                    warn!(
                        attempt,
                        delay_secs = self.retry_delay.as_secs(),
                        "Embedding request rate limited, waiting before retry"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(ProviderError::BadRequest(message)) => {
                    return Err(EmbeddingError::BadRequest(message));
                }
                Err(ProviderError::QuotaExceeded(message)) => {
                    warn!("Embedding usage cap reached");
                    if let Some(callback) = &self.on_cap_reached {
                        callback();
                    }
                    return Err(EmbeddingError::QuotaExceeded(message));
                }
                Err(other) => return Err(EmbeddingError::Service(other.to_string())),
            }
        }
    }
}

#[async_trait]
impl EmbeddingApi for EmbeddingClient {
    async fn create_embeddings(&self, inputs: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.validate(inputs)?;

        let mut results = Vec::with_capacity(inputs.len());
        for (batch_no, batch) in inputs.chunks(self.max_inputs_per_request).enumerate() {
            debug!(batch = batch_no, size = batch.len(), "Embedding batch");
            let offset = batch_no * self.max_inputs_per_request;
            let vectors = self.embed_batch(batch).await?;
            results.extend(
                vectors
                    .into_iter()
                    .enumerate()
                    .map(|(i, embedding)| Embedding { embedding, index: offset + i }),
            );
        }
        Ok(results)
    }
}
