//! A named, persisted list of embedded documents.
//!
//! Documents live as JSON lines in `<collection>/documents.jsonl`. Every
//! mutation is read-modify-write of that file with no locking: callers
//! must serialize writes to the same collection themselves.

use goalclaw_core::embedding::EmbeddingApi;
use goalclaw_core::error::{Error, StorageError};
use goalclaw_core::storage::{Workspace, join};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::vector::rank_by_similarity;

const DOCUMENTS_FILE: &str = "documents.jsonl";

pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// A document returned by [`Collection::query`] with its similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

#[derive(Clone)]
pub struct Collection {
    name: String,
    path: String,
    workspace: Arc<dyn Workspace>,
    embeddings: Arc<dyn EmbeddingApi>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl Collection {
    /// A handle to the collection stored at `path`. Nothing is read until
    /// documents are requested.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        workspace: Arc<dyn Workspace>,
        embeddings: Arc<dyn EmbeddingApi>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            workspace,
            embeddings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn documents_path(&self) -> String {
        join(&self.path, DOCUMENTS_FILE)
    }

    /// Load all documents. A collection that was never saved is empty.
    pub async fn documents(&self) -> Result<Vec<Document>, Error> {
        let path = self.documents_path();
        let content = match self.workspace.read(&path).await {
            Ok(c) => c,
            Err(StorageError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Document>(line) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(collection = %self.name, error = %e, "Skipping corrupted document");
                    None
                }
            })
            .collect())
    }

    /// Overwrite the stored documents.
    pub async fn save(&self, documents: &[Document]) -> Result<(), Error> {
        self.workspace.mkdir(&self.path).await?;
        let mut content = String::new();
        for doc in documents {
            content.push_str(&serde_json::to_string(doc)?);
            content.push('\n');
        }
        self.workspace.write(&self.documents_path(), &content).await?;
        Ok(())
    }

    /// Embed `content` and append it as a new document.
    pub async fn add(&self, content: impl Into<String>, metadata: Metadata) -> Result<Document, Error> {
        let mut added = self.add_many(vec![(content.into(), metadata)]).await?;
        added
            .pop()
            .ok_or_else(|| Error::Internal("embedding returned no document".into()))
    }

    /// Embed several texts in one call and append them in order.
    pub async fn add_many(&self, items: Vec<(String, Metadata)>) -> Result<Vec<Document>, Error> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = items.iter().map(|(content, _)| content.clone()).collect();
        let embeddings = self.embeddings.create_embeddings(&texts).await?;

        let added: Vec<Document> = items
            .into_iter()
            .zip(embeddings)
            .map(|((content, metadata), e)| Document {
                id: Uuid::new_v4().to_string(),
                content,
                metadata,
                embedding: e.embedding,
            })
            .collect();

        let mut documents = self.documents().await?;
        documents.extend(added.iter().cloned());
        self.save(&documents).await?;

        debug!(collection = %self.name, added = added.len(), total = documents.len(), "Documents added");
        Ok(added)
    }

    /// The `k` stored documents most similar to `text`, best first.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredDocument>, Error> {
        let documents = self.documents().await?;
        if documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embeddings.embed_one(text).await?;
        let ranked = rank_by_similarity(
            &query,
            documents.iter().enumerate().map(|(i, d)| (i, d.embedding.as_slice())),
            k,
        );

        Ok(ranked
            .into_iter()
            .map(|(i, score)| ScoredDocument {
                document: documents[i].clone(),
                score,
            })
            .collect())
    }

    /// Remove the collection and everything in it.
    pub async fn delete(&self) -> Result<(), Error> {
        self.workspace.remove(&self.path).await?;
        Ok(())
    }
}
