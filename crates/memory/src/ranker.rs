//! Generic top-K similarity ranking.
//!
//! A [`RetrievalRanker`] holds a list of items and a selector that turns
//! each item into text. Queries embed that text once per item (cached for
//! the ranker's lifetime), embed the query, and return the closest items.
//! The same mechanism picks the best agent for a goal and retrieves
//! documents for the `search` function.

use goalclaw_core::embedding::EmbeddingApi;
use goalclaw_core::error::EmbeddingError;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::vector::rank_by_similarity;

type Selector<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

/// One ranked result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked<'a, T> {
    pub item: &'a T,
    pub score: f32,
}

pub struct RetrievalRanker<T> {
    embeddings: Arc<dyn EmbeddingApi>,
    items: Vec<T>,
    selector: Selector<T>,
    unique: bool,
    limit: usize,
    cache: Mutex<Vec<Option<Vec<f32>>>>,
}

impl<T> RetrievalRanker<T> {
    pub fn new<F>(embeddings: Arc<dyn EmbeddingApi>, items: Vec<T>, selector: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        let cache = Mutex::new(vec![None; items.len()]);
        Self {
            embeddings,
            items,
            selector: Box::new(selector),
            unique: false,
            limit: usize::MAX,
            cache,
        }
    }

    /// Drop items whose selector text repeats an earlier item's.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Return at most `limit` items.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Items most similar to `text`, best first. Ties keep list order.
    pub async fn query(&self, text: &str) -> Result<Vec<Ranked<'_, T>>, EmbeddingError> {
        if self.items.is_empty() || self.limit == 0 {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = self.items.iter().map(|item| (self.selector)(item)).collect();

        let candidates: Vec<usize> = if self.unique {
            let mut seen = HashSet::new();
            (0..texts.len()).filter(|&i| seen.insert(texts[i].as_str())).collect()
        } else {
            (0..texts.len()).collect()
        };

        let mut cache = self.cache.lock().await;
        let missing: Vec<usize> = candidates.iter().copied().filter(|&i| cache[i].is_none()).collect();
        if !missing.is_empty() {
            debug!(count = missing.len(), "Embedding ranker items");
            let inputs: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.embeddings.create_embeddings(&inputs).await?;
            if vectors.len() != missing.len() {
                return Err(EmbeddingError::Mismatch {
                    expected: missing.len(),
                    got: vectors.len(),
                });
            }
            for (slot, embedding) in missing.iter().zip(vectors) {
                cache[*slot] = Some(embedding.embedding);
            }
        }

        let query = self.embeddings.embed_one(text).await?;

        let ranked = rank_by_similarity(
            &query,
            candidates
                .iter()
                .filter_map(|&i| cache[i].as_deref().map(|v| (i, v))),
            self.limit,
        );

        Ok(ranked
            .into_iter()
            .map(|(i, score)| Ranked { item: &self.items[i], score })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use goalclaw_core::embedding::Embedding;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Bag-of-words embedder: one dimension per known keyword.
    struct KeywordEmbedder {
        inputs_seen: AtomicUsize,
    }

    const KEYWORDS: [&str; 4] = ["code", "web", "data", "write"];

    impl KeywordEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self { inputs_seen: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl EmbeddingApi for KeywordEmbedder {
        async fn create_embeddings(&self, inputs: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
            self.inputs_seen.fetch_add(inputs.len(), Ordering::SeqCst);
            Ok(inputs
                .iter()
                .enumerate()
                .map(|(index, text)| Embedding {
                    embedding: KEYWORDS
                        .iter()
                        .map(|k| text.matches(k).count() as f32)
                        .collect(),
                    index,
                })
                .collect())
        }
    }

    fn names(results: &[Ranked<'_, (&str, &str)>]) -> Vec<String> {
        results.iter().map(|r| r.item.0.to_string()).collect()
    }

    #[tokio::test]
    async fn returns_most_similar_first() {
        let items = vec![("dev", "code code"), ("web", "web"), ("analyst", "data")];
        let ranker = RetrievalRanker::new(KeywordEmbedder::new(), items, |i| i.1.to_string());

        let results = ranker.query("browse the web").await.unwrap();

        assert_eq!(names(&results)[0], "web");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn limit_caps_results() {
        let items = vec![("a", "code"), ("b", "web"), ("c", "data")];
        let ranker = RetrievalRanker::new(KeywordEmbedder::new(), items, |i| i.1.to_string()).limit(1);
        let results = ranker.query("data please").await.unwrap();
        assert_eq!(names(&results), vec!["c"]);
    }

    #[tokio::test]
    async fn unique_keeps_first_of_identical_texts() {
        let items = vec![("first", "web"), ("second", "web"), ("other", "code")];
        let ranker = RetrievalRanker::new(KeywordEmbedder::new(), items, |i| i.1.to_string()).unique(true);

        let results = ranker.query("web").await.unwrap();

        assert_eq!(names(&results), vec!["first", "other"]);
    }

    #[tokio::test]
    async fn ties_keep_original_order() {
        let items = vec![("x", "data"), ("y", "data"), ("z", "data")];
        let ranker = RetrievalRanker::new(KeywordEmbedder::new(), items, |i| i.1.to_string());
        let results = ranker.query("data").await.unwrap();
        assert_eq!(names(&results), vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn item_embeddings_are_cached() {
        let embedder = KeywordEmbedder::new();
        let items = vec![("a", "code"), ("b", "web")];
        let ranker = RetrievalRanker::new(embedder.clone(), items, |i| i.1.to_string());

        ranker.query("code").await.unwrap();
        ranker.query("web").await.unwrap();

        // 2 items once, plus one query embedding per call
        assert_eq!(embedder.inputs_seen.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn empty_ranker_returns_nothing() {
        let ranker: RetrievalRanker<String> =
            RetrievalRanker::new(KeywordEmbedder::new(), vec![], |s: &String| s.clone());
        assert!(ranker.query("anything").await.unwrap().is_empty());
    }
}
