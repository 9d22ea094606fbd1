//! Storage for rendered permit documents.
//!
//! Documents are addressed by a relative path such as
//! `permits/PT-2026-0001.pdf`. A path that is absolute or climbs out of the
//! root with `..` is rejected before any I/O happens.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, StoreError};

/// Where exported PDFs are written and read back for verification.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write `bytes` at `path`, replacing any previous document.
    async fn persist(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read the document at `path`. `None` if nothing is stored there.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

fn checked_relative(path: &str) -> Result<&Path> {
    let p = Path::new(path);
    if path.is_empty() || !p.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(p)
}

/// Filesystem-backed document storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(self.root.join(checked_relative(path)?))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn persist(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so a reader never sees a half-written file.
        let mut tmp = target.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &target).await?;

        tracing::debug!(path, len = bytes.len(), "document persisted");
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory document storage for tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the document at `path`, returning whether one was there.
    pub fn remove(&self, path: &str) -> Result<bool> {
        let mut files = self
            .files
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(files.remove(path).is_some())
    }

    /// Replace the stored bytes behind the workflow's back.
    pub fn overwrite(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        checked_relative(path)?;
        let mut files = self
            .files
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        files.insert(path.to_string(), bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn persist(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.overwrite(path, bytes.to_vec())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        checked_relative(path)?;
        let files = self
            .files
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(files.get(path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_persist_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());

        store
            .persist("permits/PT-2026-0001.pdf", b"%PDF-1.5 one")
            .await
            .unwrap();
        store
            .persist("permits/PT-2026-0001.pdf", b"%PDF-1.5 two")
            .await
            .unwrap();

        let bytes = store.read("permits/PT-2026-0001.pdf").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"%PDF-1.5 two"[..]));
        assert!(dir.path().join("permits/PT-2026-0001.pdf").exists());
        assert!(!dir.path().join("permits/PT-2026-0001.pdf.tmp").exists());
    }

    #[tokio::test]
    async fn test_fs_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        assert!(store.read("permits/absent.pdf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_paths_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());

        for bad in ["", "../escape.pdf", "/etc/passwd", "permits/../../x.pdf", "./x.pdf"] {
            assert!(
                matches!(store.persist(bad, b"x").await, Err(StoreError::InvalidPath(_))),
                "{bad:?} accepted"
            );
        }
        assert!(matches!(
            MemoryDocumentStore::new().read("../x").await,
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_remove_and_overwrite() {
        let store = MemoryDocumentStore::new();
        store.persist("permits/a.pdf", b"a").await.unwrap();
        assert_eq!(store.len(), 1);

        store.overwrite("permits/a.pdf", b"tampered".to_vec()).unwrap();
        assert_eq!(
            store.read("permits/a.pdf").await.unwrap(),
            Some(b"tampered".to_vec())
        );

        assert!(store.remove("permits/a.pdf").unwrap());
        assert!(!store.remove("permits/a.pdf").unwrap());
        assert!(store.read("permits/a.pdf").await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
