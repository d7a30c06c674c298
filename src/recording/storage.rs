//! Audio blob storage.
//!
//! Blobs are addressed by a relative reference such as `audio/<id>.wav`.
//! [`FsStorage`] maps references onto files under a root directory;
//! [`InMemoryStorage`] keeps them in a map.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob '{0}' not found")]
    NotFound(String),

    #[error("invalid blob reference '{0}'")]
    InvalidRef(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads and writes audio blobs.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn read(&self, blob_ref: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or replace the blob at `blob_ref`.
    async fn write(&self, blob_ref: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove a blob.  Missing blobs are not an error.
    async fn delete(&self, blob_ref: &str) -> Result<(), StorageError>;

    /// Remove a blob staged under [`temp_ref`].  Refuses anything outside
    /// `tmp/`.
    async fn delete_temp(&self, blob_ref: &str) -> Result<(), StorageError> {
        if !blob_ref.starts_with(TEMP_PREFIX) {
            return Err(StorageError::InvalidRef(blob_ref.to_string()));
        }
        self.delete(blob_ref).await
    }
}

const TEMP_PREFIX: &str = "tmp/";

/// Reference under which a temporary copy of `blob_ref` is staged.
pub fn temp_ref(blob_ref: &str, tag: &str) -> String {
    format!("{TEMP_PREFIX}{tag}-{}", blob_ref.replace('/', "_"))
}

// ---------------------------------------------------------------------------
// FsStorage
// ---------------------------------------------------------------------------

/// Blobs stored as files below `root`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for `blob_ref`; rejects absolute paths and `..`.
    pub fn path_of(&self, blob_ref: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(blob_ref);
        let safe = !blob_ref.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidRef(blob_ref.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStorage for FsStorage {
    async fn read(&self, blob_ref: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_of(blob_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(blob_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, blob_ref: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_of(blob_ref)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        log::debug!("storage: wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    async fn delete(&self, blob_ref: &str) -> Result<(), StorageError> {
        let path = self.path_of(blob_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryStorage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, blob_ref: &str) -> bool {
        self.blobs.lock().contains_key(blob_ref)
    }

    /// All stored references, sorted.
    pub fn refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = self.blobs.lock().keys().cloned().collect();
        refs.sort();
        refs
    }
}

#[async_trait]
impl BlobStorage for InMemoryStorage {
    async fn read(&self, blob_ref: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .lock()
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(blob_ref.to_string()))
    }

    async fn write(&self, blob_ref: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .insert(blob_ref.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, blob_ref: &str) -> Result<(), StorageError> {
        self.blobs.lock().remove(blob_ref);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(storage: &dyn BlobStorage) {
        assert!(matches!(
            storage.read("audio/missing.wav").await,
            Err(StorageError::NotFound(_))
        ));

        storage.write("audio/a.wav", b"RIFF").await.unwrap();
        assert_eq!(storage.read("audio/a.wav").await.unwrap(), b"RIFF");

        storage.write("audio/a.wav", b"RIFF2").await.unwrap();
        assert_eq!(storage.read("audio/a.wav").await.unwrap(), b"RIFF2");

        let tmp = temp_ref("audio/a.wav", "convert");
        storage.write(&tmp, b"staged").await.unwrap();
        storage.delete_temp(&tmp).await.unwrap();
        assert!(storage.read(&tmp).await.is_err());
        // Deleting twice is fine.
        storage.delete_temp(&tmp).await.unwrap();

        // Only staged blobs go through delete_temp.
        assert!(matches!(
            storage.delete_temp("audio/a.wav").await,
            Err(StorageError::InvalidRef(_))
        ));
        storage.write("audio/b.mp3", b"ID3").await.unwrap();
        storage.delete("audio/b.mp3").await.unwrap();
        assert!(storage.read("audio/b.mp3").await.is_err());
    }

    #[tokio::test]
    async fn fs_storage_contract() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        exercise(&storage).await;
        assert!(dir.path().join("audio").join("a.wav").exists());
    }

    #[tokio::test]
    async fn in_memory_storage_contract() {
        let storage = InMemoryStorage::new();
        exercise(&storage).await;
        assert_eq!(storage.refs(), vec!["audio/a.wav".to_string()]);
    }

    #[test]
    fn fs_storage_rejects_escaping_refs() {
        let storage = FsStorage::new("/data");
        assert!(storage.path_of("../etc/passwd").is_err());
        assert!(storage.path_of("/etc/passwd").is_err());
        assert!(storage.path_of("").is_err());
        assert_eq!(
            storage.path_of("audio/x.wav").unwrap(),
            PathBuf::from("/data/audio/x.wav")
        );
    }

    #[test]
    fn temp_ref_is_flat() {
        assert_eq!(temp_ref("audio/x.wav", "convert"), "tmp/convert-audio_x.wav");
    }
}
