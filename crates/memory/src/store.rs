//! A directory of collections.

use goalclaw_core::embedding::EmbeddingApi;
use goalclaw_core::error::{Error, StorageError};
use goalclaw_core::storage::{Workspace, join};
use std::sync::Arc;
use tracing::{debug, info};

use crate::collection::Collection;

/// Collections stored as subdirectories of `uri` in a workspace.
///
/// Names map one-to-one to directories, so no name can repeat.
pub struct VectorStore {
    workspace: Arc<dyn Workspace>,
    uri: String,
    embeddings: Arc<dyn EmbeddingApi>,
}

impl VectorStore {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        uri: impl Into<String>,
        embeddings: Arc<dyn EmbeddingApi>,
    ) -> Self {
        Self {
            workspace,
            uri: uri.into(),
            embeddings,
        }
    }

    fn handle(&self, name: &str) -> Collection {
        Collection::new(
            name,
            join(&self.uri, name),
            self.workspace.clone(),
            self.embeddings.clone(),
        )
    }

    fn check_name(name: &str) -> Result<(), Error> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StorageError::InvalidPath(format!("invalid collection name '{name}'")).into());
        }
        Ok(())
    }

    /// Create an empty collection and persist it immediately.
    ///
    /// An existing collection with the same name is replaced by the empty one.
    pub async fn add_collection(&self, name: &str) -> Result<Collection, Error> {
        Self::check_name(name)?;
        let collection = self.handle(name);
        collection.save(&[]).await?;
        info!(collection = name, "Collection created");
        Ok(collection)
    }

    /// Open an existing collection, if there is one.
    pub async fn collection(&self, name: &str) -> Result<Option<Collection>, Error> {
        Self::check_name(name)?;
        let collection = self.handle(name);
        if self.workspace.exists(collection.path()).await? {
            Ok(Some(collection))
        } else {
            Ok(None)
        }
    }

    /// Delete a collection. Missing collections and storage failures are
    /// ignored, so deletion is idempotent.
    pub async fn remove_collection(&self, name: &str) {
        if Self::check_name(name).is_err() {
            debug!(collection = name, "Ignoring removal of invalid collection name");
            return;
        }
        if let Err(e) = self.handle(name).delete().await {
            debug!(collection = name, error = %e, "Collection removal ignored");
        }
    }

    /// One handle per directory under the store. Documents are not loaded.
    pub async fn list_collections(&self) -> Result<Vec<Collection>, Error> {
        let entries = match self.workspace.read_dir(&self.uri).await {
            Ok(entries) => entries,
            Err(StorageError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(entries
            .into_iter()
            .filter(|e| e.is_dir())
            .map(|e| self.handle(&e.name))
            .collect())
    }
}
