//! Storage backend abstraction.
//!
//! The core treats storage as key-value-over-paths: `/`-separated names
//! relative to some root, holding text blobs or acting as directories.
//! Collections, vector stores, file functions and the debug log all go
//! through [`Workspace`], so an in-memory backend can stand in for disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

#[async_trait]
pub trait Workspace: Send + Sync {
    /// List a directory, sorted by name.
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    async fn read(&self, path: &str) -> Result<String, StorageError>;

    /// Create or replace a file, creating parent directories as needed.
    async fn write(&self, path: &str, data: &str) -> Result<(), StorageError>;

    /// Append to a file, creating it if missing.
    async fn append(&self, path: &str, data: &str) -> Result<(), StorageError>;

    /// Remove a file, or a directory and everything beneath it.
    async fn remove(&self, path: &str) -> Result<(), StorageError>;

    async fn mkdir(&self, path: &str) -> Result<(), StorageError>;
}

/// Join two workspace paths with a single `/`.
pub fn join(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{name}"),
    }
}
