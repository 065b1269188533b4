//! Embedding API consumed by retrieval.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

/// One embedding vector and the position of the input it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub embedding: Vec<f32>,
    pub index: usize,
}

/// Turns text into vectors.
///
/// Results are one-to-one with `inputs` and in the same order.
#[async_trait]
pub trait EmbeddingApi: Send + Sync {
    async fn create_embeddings(&self, inputs: &[String]) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut result = self.create_embeddings(&[text.to_string()]).await?;
        if result.len() != 1 {
            return Err(EmbeddingError::Mismatch { expected: 1, got: result.len() });
        }
        Ok(result.remove(0).embedding)
    }
}
