//! Storage backends implementing `goalclaw_core::Workspace`.
//!
//! [`FsWorkspace`] keeps every path inside its root directory.
//! [`InMemoryWorkspace`] keeps everything in ordered maps, for tests and
//! throwaway sessions.

use async_trait::async_trait;
use goalclaw_core::error::StorageError;
use goalclaw_core::storage::{DirEntry, EntryKind, Workspace};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

/// Reject absolute paths and `..` components; return the cleaned relative path.
fn sanitize(path: &str) -> Result<String, StorageError> {
    let normalized = path.replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(StorageError::InvalidPath(format!("path traversal in '{path}'")));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath(format!("absolute path '{path}'")));
            }
        }
    }
    Ok(parts.join("/"))
}

fn io_error(path: &str, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        }
    }
}

/// A workspace rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: PathBuf,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a workspace path to a location under the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let clean = sanitize(path)?;
        if clean.is_empty() {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(clean))
    }

    async fn ensure_parent(&self, full: &Path, path: &str) -> Result<(), StorageError> {
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        let full = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&full).await.map_err(|e| io_error(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| io_error(path, e))? {
            let file_type = entry.file_type().await.map_err(|e| io_error(path, e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if file_type.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full).await.map_err(|e| io_error(path, e))
    }

    async fn read(&self, path: &str) -> Result<String, StorageError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full).await.map_err(|e| io_error(path, e))
    }

    async fn write(&self, path: &str, data: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full, path).await?;
        tokio::fs::write(&full, data).await.map_err(|e| io_error(path, e))
    }

    async fn append(&self, path: &str, data: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full, path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await
            .map_err(|e| io_error(path, e))?;
        file.write_all(data.as_bytes()).await.map_err(|e| io_error(path, e))?;
        file.flush().await.map_err(|e| io_error(path, e))
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(StorageError::InvalidPath("refusing to remove the workspace root".into()));
        }
        let metadata = tokio::fs::metadata(&full).await.map_err(|e| io_error(path, e))?;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&full).await.map_err(|e| io_error(path, e))?;
        } else {
            tokio::fs::remove_file(&full).await.map_err(|e| io_error(path, e))?;
        }
        debug!(path, "Removed from workspace");
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full).await.map_err(|e| io_error(path, e))
    }
}

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
}

impl Tree {
    fn add_ancestors(&mut self, path: &str) {
        let mut current = String::new();
        for part in path.split('/') {
            if !current.is_empty() {
                self.dirs.insert(current.clone());
                current.push('/');
            }
            current.push_str(part);
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        path.is_empty() || self.dirs.contains(path)
    }
}

/// A workspace held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    tree: RwLock<Tree>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Workspace for InMemoryWorkspace {
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        let path = sanitize(path)?;
        let tree = self.tree.read().await;
        if !tree.is_dir(&path) {
            return Err(StorageError::NotFound(path));
        }

        let prefix = if path.is_empty() { String::new() } else { format!("{path}/") };
        let child = |key: &String| {
            key.strip_prefix(&prefix)
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .map(str::to_string)
        };

        let mut entries: Vec<DirEntry> = tree
            .dirs
            .iter()
            .filter_map(|d| child(d).map(|name| DirEntry { name, kind: EntryKind::Directory }))
            .chain(
                tree.files
                    .keys()
                    .filter_map(|f| child(f).map(|name| DirEntry { name, kind: EntryKind::File })),
            )
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let path = sanitize(path)?;
        let tree = self.tree.read().await;
        Ok(tree.is_dir(&path) || tree.files.contains_key(&path))
    }

    async fn read(&self, path: &str) -> Result<String, StorageError> {
        let path = sanitize(path)?;
        self.tree
            .read()
            .await
            .files
            .get(&path)
            .cloned()
            .ok_or(StorageError::NotFound(path))
    }

    async fn write(&self, path: &str, data: &str) -> Result<(), StorageError> {
        let path = sanitize(path)?;
        let mut tree = self.tree.write().await;
        if path.is_empty() || tree.dirs.contains(&path) {
            return Err(StorageError::InvalidPath(format!("'{path}' is a directory")));
        }
        tree.add_ancestors(&path);
        tree.files.insert(path, data.to_string());
        Ok(())
    }

    async fn append(&self, path: &str, data: &str) -> Result<(), StorageError> {
        let path = sanitize(path)?;
        let mut tree = self.tree.write().await;
        if path.is_empty() || tree.dirs.contains(&path) {
            return Err(StorageError::InvalidPath(format!("'{path}' is a directory")));
        }
        tree.add_ancestors(&path);
        tree.files.entry(path).or_default().push_str(data);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let path = sanitize(path)?;
        if path.is_empty() {
            return Err(StorageError::InvalidPath("refusing to remove the workspace root".into()));
        }
        let mut tree = self.tree.write().await;
        if tree.files.remove(&path).is_some() {
            return Ok(());
        }
        if !tree.dirs.remove(&path) {
            return Err(StorageError::NotFound(path));
        }
        let prefix = format!("{path}/");
        tree.files.retain(|k, _| !k.starts_with(&prefix));
        tree.dirs.retain(|k| !k.starts_with(&prefix));
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        let path = sanitize(path)?;
        if path.is_empty() {
            return Ok(());
        }
        let mut tree = self.tree.write().await;
        if tree.files.contains_key(&path) {
            return Err(StorageError::InvalidPath(format!("'{path}' is a file")));
        }
        tree.add_ancestors(&path);
        tree.dirs.insert(path);
        Ok(())
    }
}
