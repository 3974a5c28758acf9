//! Product file storage on the local filesystem.
//!
//! Files live under `<root>/<seller>/<product>/<file>`. Keys are generated
//! from IDs, never from user input, but every key is still checked before it
//! touches the filesystem.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use shelfkeeper_core::{ProductFileId, ProductId, SellerId};

/// Errors from the file store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("stored file not found: {0}")]
    NotFound(String),
}

/// Local-filesystem blob store for product files.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The storage key for a product file.
    #[must_use]
    pub fn key(seller_id: SellerId, product_id: ProductId, file_id: ProductFileId) -> String {
        format!("{seller_id}/{product_id}/{file_id}")
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(relative))
    }

    /// Write `bytes` under `key`, replacing any previous content.
    ///
    /// The bytes go to a temporary sibling first and are renamed into place,
    /// so a reader never sees a half-written file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidKey` or `StorageError::Io`.
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("partial");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;

        tracing::debug!(key, size = bytes.len(), "Stored product file");
        Ok(())
    }

    /// Read the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing is stored there.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_owned())),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the file under `key`. Removing a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidKey` or `StorageError::Io`.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete several keys, logging failures instead of stopping.
    ///
    /// Used after a product delete, when the rows are already gone and a
    /// leftover blob is only wasted space.
    pub async fn delete_all(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.delete(key).await {
                tracing::warn!(key, error = %e, "Failed to delete stored product file");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = FileStore::key(
            SellerId::generate(),
            ProductId::generate(),
            ProductFileId::generate(),
        );

        store.put(&key, b"%PDF-1.7").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"%PDF-1.7");

        store.put(&key, b"v2").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"v2");

        store.delete(&key).await.unwrap();
        assert!(matches!(
            store.get(&key).await,
            Err(StorageError::NotFound(_))
        ));
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        for key in ["../etc/passwd", "/abs/path", "a/../../b", ""] {
            assert!(
                matches!(store.get(key).await, Err(StorageError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn test_key_layout() {
        let seller = SellerId::generate();
        let product = ProductId::generate();
        let file = ProductFileId::generate();
        assert_eq!(
            FileStore::key(seller, product, file),
            format!("{seller}/{product}/{file}")
        );
    }
}
