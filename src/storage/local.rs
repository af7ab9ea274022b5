use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::{
    error::{GenerationError, Result},
    storage::traits::ObjectStore,
};

/// Object store rooted at a directory; keys map to relative paths.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            GenerationError::Configuration(format!(
                "Failed to create storage root {}: {}",
                root.display(),
                e
            ))
        })?;
        log::info!("Local object storage at {}", root.display());
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(GenerationError::Persistence(format!(
                "Invalid object key: {}",
                key
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                GenerationError::Persistence(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| GenerationError::Persistence(format!("Failed to write {}: {}", key, e)))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GenerationError::Persistence(format!(
                "Failed to read {}: {}",
                key, e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GenerationError::Persistence(format!(
                "Failed to delete {}: {}",
                key, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().join("media")).await.unwrap();

        store.put("images/abc", b"png".to_vec(), "image/png").await.unwrap();
        assert!(dir.path().join("media/images/abc").exists());
        assert_eq!(store.get("images/abc").await.unwrap(), Some(b"png".to_vec()));

        assert!(store.delete("images/abc").await.unwrap());
        assert!(!store.delete("images/abc").await.unwrap());
        assert_eq!(store.get("images/abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).await.unwrap();
        for key in ["../etc/passwd", "/abs/key", ""] {
            assert!(store.put(key, vec![1], "image/png").await.is_err(), "{}", key);
        }
    }
}
