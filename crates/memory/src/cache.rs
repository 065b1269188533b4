//! Content-keyed embedding cache.
//!
//! [`CachedEmbeddings`] wraps any [`EmbeddingApi`] and remembers the vector
//! for every text it has embedded, so repeated retrieval over the same
//! workspace only pays for text it has not seen before.

use async_trait::async_trait;
use goalclaw_core::embedding::{Embedding, EmbeddingApi};
use goalclaw_core::error::EmbeddingError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct CachedEmbeddings {
    inner: Arc<dyn EmbeddingApi>,
    vectors: Mutex<HashMap<String, Vec<f32>>>,
}

impl CachedEmbeddings {
    pub fn new(inner: Arc<dyn EmbeddingApi>) -> Self {
        Self {
            inner,
            vectors: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct texts cached so far.
    pub async fn len(&self) -> usize {
        self.vectors.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EmbeddingApi for CachedEmbeddings {
    async fn create_embeddings(&self, inputs: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        // Held across the request so concurrent callers never embed the same text twice.
        let mut vectors = self.vectors.lock().await;

        let mut missing: Vec<String> = Vec::new();
        for input in inputs {
            if !vectors.contains_key(input) && !missing.contains(input) {
                missing.push(input.clone());
            }
        }

        if !missing.is_empty() {
            debug!(count = missing.len(), cached = vectors.len(), "Embedding uncached texts");
            let fresh = self.inner.create_embeddings(&missing).await?;
            if fresh.len() != missing.len() {
                return Err(EmbeddingError::Mismatch {
                    expected: missing.len(),
                    got: fresh.len(),
                });
            }
            for (text, embedding) in missing.into_iter().zip(fresh) {
                vectors.insert(text, embedding.embedding);
            }
        }

        inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                vectors
                    .get(input)
                    .map(|embedding| Embedding {
                        embedding: embedding.clone(),
                        index,
                    })
                    .ok_or(EmbeddingError::Mismatch {
                        expected: inputs.len(),
                        got: index,
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEmbedder {
        inputs_seen: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingApi for CountingEmbedder {
        async fn create_embeddings(&self, inputs: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
            self.inputs_seen.fetch_add(inputs.len(), Ordering::SeqCst);
            Ok(inputs
                .iter()
                .enumerate()
                .map(|(index, s)| Embedding {
                    embedding: vec![s.len() as f32],
                    index,
                })
                .collect())
        }
    }

    struct QuotaEmbedder;

    #[async_trait]
    impl EmbeddingApi for QuotaEmbedder {
        async fn create_embeddings(&self, _inputs: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
            Err(EmbeddingError::QuotaExceeded("subsidy max".into()))
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn embeds_each_text_once() {
        let inner = Arc::new(CountingEmbedder::default());
        let cache = CachedEmbeddings::new(inner.clone());

        let first = cache.create_embeddings(&texts(&["a", "bb", "a"])).await.unwrap();
        assert_eq!(inner.inputs_seen.load(Ordering::SeqCst), 2);
        assert_eq!(first.len(), 3);
        assert_eq!(first[2].index, 2);
        assert_eq!(first[2].embedding, vec![1.0]);

        let second = cache.create_embeddings(&texts(&["bb", "ccc"])).await.unwrap();
        assert_eq!(inner.inputs_seen.load(Ordering::SeqCst), 3);
        assert_eq!(second[0].embedding, vec![2.0]);
        assert_eq!(second[1].embedding, vec![3.0]);
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn failures_pass_through_and_cache_nothing() {
        let cache = CachedEmbeddings::new(Arc::new(QuotaEmbedder));
        let err = cache.create_embeddings(&texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::QuotaExceeded(_)));
        assert!(cache.is_empty().await);
    }
}
