//! Where rewritten documents come from and go to.
//!
//! The engine never touches the filesystem directly. Editors hand it open
//! buffers through their own store; the CLI and the tests use the two stores
//! below.

use super::edit::{TextEdit, apply_edits};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current text of `path`.
    async fn read(&self, path: &Path) -> Result<String>;

    /// Apply `edits` as one batch and return the new text. Either every edit
    /// lands or the document is left untouched.
    async fn apply(&self, path: &Path, edits: &[TextEdit]) -> Result<String>;

    /// Create a new document. Fails when `path` already exists.
    async fn create(&self, path: &Path, text: &str) -> Result<()>;
}

/// Documents on disk.
#[derive(Debug, Default, Clone)]
pub struct FsDocumentStore;

impl FsDocumentStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn apply(&self, path: &Path, edits: &[TextEdit]) -> Result<String> {
        let text = tokio::fs::read_to_string(path).await?;
        let updated = apply_edits(&text, edits)?;

        // Write beside the target then rename over it
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".alscope-tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, updated.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(updated)
    }

    async fn create(&self, path: &Path, text: &str) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Documents held in memory, keyed by path.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: DashMap<PathBuf, String>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.docs.insert(path.into(), text.into());
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.docs.get(path).map(|d| d.value().clone())
    }

    pub fn remove(&self, path: &Path) -> Option<String> {
        self.docs.remove(path).map(|(_, text)| text)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.docs.iter().map(|d| d.key().clone()).collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, path: &Path) -> Result<String> {
        self.get(path)
            .ok_or_else(|| CoreError::NotFound(format!("document {}", path.display())))
    }

    async fn apply(&self, path: &Path, edits: &[TextEdit]) -> Result<String> {
        let mut doc = self
            .docs
            .get_mut(path)
            .ok_or_else(|| CoreError::NotFound(format!("document {}", path.display())))?;
        let updated = apply_edits(doc.value(), edits)?;
        *doc.value_mut() = updated.clone();
        Ok(updated)
    }

    async fn create(&self, path: &Path, text: &str) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.docs.entry(path.to_path_buf()) {
            Entry::Occupied(_) => Err(CoreError::Plan(format!(
                "{} already exists",
                path.display()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(text.to_string());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alscope_api::models::Span;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fs_store_apply_and_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.al");
        let store = FsDocumentStore::new();

        store.create(&path, "table 1 A\n{\n}\n").await.unwrap();
        assert!(store.create(&path, "again").await.is_err());

        let out = store
            .apply(&path, &[TextEdit::replace(Span::new(6, 7), "2")])
            .await
            .unwrap();
        assert_eq!(out, "table 2 A\n{\n}\n");
        assert_eq!(store.read(&path).await.unwrap(), out);
        assert!(!dir.path().join("a.al.alscope-tmp").exists());
    }

    #[tokio::test]
    async fn test_fs_store_rejected_batch_leaves_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.al");
        std::fs::write(&path, "abc").unwrap();
        let store = FsDocumentStore::new();

        let res = store
            .apply(&path, &[TextEdit::replace(Span::new(1, 9), "x")])
            .await;
        assert!(res.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_memory_store_missing_document() {
        let store = MemoryDocumentStore::new();
        let err = store.read(Path::new("/nope.al")).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(
            store
                .apply(Path::new("/nope.al"), &[TextEdit::insert(0, "x")])
                .await
                .is_err()
        );
    }
}
