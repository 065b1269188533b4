//! `goalclaw collections`: manage the vector store under `<root>/collections`.

use std::path::PathBuf;
use std::sync::Arc;

use goalclaw_core::storage::Workspace;
use goalclaw_memory::{Collection, FsWorkspace, Metadata, VectorStore};

use super::CliResult;

pub struct Collections {
    store: VectorStore,
}

/// Open the store configured for `root` (or the config's root).
pub async fn open(root: Option<PathBuf>) -> CliResult<Collections> {
    let config = super::load_config(root)?;
    let providers = goalclaw_providers::build_from_config(&config)?;
    let embeddings = super::embedding_client(&config, providers.embeddings, super::tokenizer()?);

    let storage: Arc<dyn Workspace> = Arc::new(FsWorkspace::new(&config.workspace.root_dir));
    let store = VectorStore::new(storage, config.workspace.collections_dir.clone(), Arc::new(embeddings));
    Ok(Collections { store })
}

impl Collections {
    async fn existing(&self, name: &str) -> CliResult<Collection> {
        self.store
            .collection(name)
            .await?
            .ok_or_else(|| format!("No collection named '{name}' (create it with `goalclaw collections new {name}`)").into())
    }

    pub async fn list(&self) -> CliResult<()> {
        let collections = self.store.list_collections().await?;
        if collections.is_empty() {
            println!("   No collections yet.");
            return Ok(());
        }
        for collection in collections {
            let count = collection.documents().await?.len();
            println!("   📚 {} ({count} documents)", collection.name());
        }
        Ok(())
    }

    pub async fn create(&self, name: &str) -> CliResult<()> {
        self.store.add_collection(name).await?;
        println!("   ✅ Created collection '{name}'");
        Ok(())
    }

    pub async fn add(&self, name: &str, text: Option<String>, file: Option<PathBuf>) -> CliResult<()> {
        let collection = self.existing(name).await?;

        let mut metadata = Metadata::new();
        let content = match (text, file) {
            (Some(text), _) => text,
            (None, Some(path)) => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
                metadata.insert("source".into(), path.display().to_string().into());
                content
            }
            (None, None) => return Err("give the document text or --file".into()),
        };

        let document = collection.add(content, metadata).await?;
        println!("   ✅ Added document {} to '{name}'", document.id);
        Ok(())
    }

    pub async fn query(&self, name: &str, query: &str, limit: usize) -> CliResult<()> {
        let collection = self.existing(name).await?;
        let results = collection.query(query, limit).await?;
        if results.is_empty() {
            println!("   No documents in '{name}'.");
        }
        for (rank, scored) in results.iter().enumerate() {
            println!("{}. [{:.3}] {}", rank + 1, scored.score, scored.document.id);
            for line in scored.document.content.lines() {
                println!("   {line}");
            }
        }
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> CliResult<()> {
        self.store.remove_collection(name).await;
        println!("   🗑️  Removed collection '{name}'");
        Ok(())
    }
}
