//! In-process stores for tests and dry runs. Both support fault injection
//! so compensation paths can be exercised without a real backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{GenerationError, Result},
    models::{ArtifactRecord, GenerationSet, NewArtifact, NewGenerationSet},
    storage::traits::{MetadataStore, ObjectStore},
};

fn poisoned() -> GenerationError {
    GenerationError::Persistence("memory store lock poisoned".into())
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    failing_puts: Mutex<HashSet<usize>>,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given put calls (0-based, in call order) fail.
    pub fn fail_puts(self, calls: impl IntoIterator<Item = usize>) -> Self {
        if let Ok(mut failing) = self.failing_puts.lock() {
            failing.extend(calls);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .ok()
            .and_then(|o| o.get(key).map(|obj| obj.content_type.clone()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let call = self.puts.fetch_add(1, Ordering::SeqCst);
        if self.failing_puts.lock().map_err(|_| poisoned())?.contains(&call) {
            return Err(GenerationError::Persistence(format!(
                "injected put failure for {}",
                key
            )));
        }

        self.objects.lock().map_err(|_| poisoned())?.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let objects = self.objects.lock().map_err(|_| poisoned())?;
        Ok(objects.get(key).map(|obj| obj.bytes.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut objects = self.objects.lock().map_err(|_| poisoned())?;
        Ok(objects.remove(key).is_some())
    }
}

#[derive(Default)]
struct Tables {
    sets: HashMap<Uuid, GenerationSet>,
    artifacts: Vec<ArtifactRecord>,
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    tables: Mutex<Tables>,
    fail_create_set: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create_set(self) -> Self {
        self.fail_create_set.store(true, Ordering::SeqCst);
        self
    }

    /// Every delete call errors, for exercising cleanup failure paths.
    pub fn fail_deletes(self) -> Self {
        self.fail_deletes.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_count(&self) -> usize {
        self.tables.lock().map(|t| t.sets.len()).unwrap_or(0)
    }

    pub fn artifact_count(&self) -> usize {
        self.tables.lock().map(|t| t.artifacts.len()).unwrap_or(0)
    }

    fn check_delete(&self, what: &str, id: Uuid) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(GenerationError::Persistence(format!(
                "injected delete failure for {} {}",
                what, id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create_set(&self, set: NewGenerationSet) -> Result<GenerationSet> {
        if self.fail_create_set.load(Ordering::SeqCst) {
            return Err(GenerationError::Persistence(
                "injected failure creating generation set".into(),
            ));
        }

        let record = GenerationSet {
            id: Uuid::new_v4(),
            user_id: set.user_id,
            model: set.model,
            prompt: set.prompt,
            created_at: Utc::now(),
        };
        let mut tables = self.tables.lock().map_err(|_| poisoned())?;
        tables.sets.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_set(&self, id: Uuid) -> Result<Option<GenerationSet>> {
        let tables = self.tables.lock().map_err(|_| poisoned())?;
        Ok(tables.sets.get(&id).cloned())
    }

    async fn delete_set(&self, id: Uuid) -> Result<bool> {
        self.check_delete("set", id)?;
        let mut tables = self.tables.lock().map_err(|_| poisoned())?;
        let removed = tables.sets.remove(&id).is_some();
        tables.artifacts.retain(|a| a.set_id != id);
        Ok(removed)
    }

    async fn create_artifact(&self, artifact: NewArtifact) -> Result<ArtifactRecord> {
        let mut tables = self.tables.lock().map_err(|_| poisoned())?;
        if !tables.sets.contains_key(&artifact.set_id) {
            return Err(GenerationError::Persistence(format!(
                "generation set {} does not exist",
                artifact.set_id
            )));
        }

        let record = ArtifactRecord {
            id: Uuid::new_v4(),
            set_id: artifact.set_id,
            kind: artifact.kind,
            params: artifact.params,
            content_type: artifact.content_type,
            byte_size: artifact.byte_size,
            created_at: Utc::now(),
        };
        tables.artifacts.push(record.clone());
        Ok(record)
    }

    async fn delete_artifact(&self, id: Uuid) -> Result<bool> {
        self.check_delete("artifact", id)?;
        let mut tables = self.tables.lock().map_err(|_| poisoned())?;
        let before = tables.artifacts.len();
        tables.artifacts.retain(|a| a.id != id);
        Ok(tables.artifacts.len() != before)
    }

    async fn list_artifacts(&self, set_id: Uuid) -> Result<Vec<ArtifactRecord>> {
        let tables = self.tables.lock().map_err(|_| poisoned())?;
        Ok(tables
            .artifacts
            .iter()
            .filter(|a| a.set_id == set_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.tables.lock().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationParams, GenerationRequest, MediaKind};

    fn new_set() -> NewGenerationSet {
        NewGenerationSet {
            user_id: "user-1".into(),
            model: "mock-provider".into(),
            prompt: "a red fox".into(),
        }
    }

    fn new_artifact(set_id: Uuid) -> NewArtifact {
        let request = GenerationRequest::new("a red fox", "mock-provider");
        NewArtifact {
            set_id,
            kind: MediaKind::Image,
            params: GenerationParams::from(&request),
            content_type: "image/png".into(),
            byte_size: 3,
        }
    }

    #[tokio::test]
    async fn deleting_set_cascades_to_artifacts() {
        let store = MemoryMetadataStore::new();
        let set = store.create_set(new_set()).await.unwrap();
        store.create_artifact(new_artifact(set.id)).await.unwrap();
        store.create_artifact(new_artifact(set.id)).await.unwrap();
        assert_eq!(store.list_artifacts(set.id).await.unwrap().len(), 2);

        assert!(store.delete_set(set.id).await.unwrap());
        assert_eq!(store.artifact_count(), 0);
        assert!(store.get_set(set.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn artifact_requires_existing_set() {
        let store = MemoryMetadataStore::new();
        let err = store.create_artifact(new_artifact(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, GenerationError::Persistence(_)));
    }

    #[tokio::test]
    async fn injected_put_failure_hits_only_that_call() {
        let store = MemoryObjectStore::new().fail_puts([1]);
        store.put("images/a", vec![1], "image/png").await.unwrap();
        assert!(store.put("images/b", vec![2], "image/png").await.is_err());
        store.put("images/c", vec![3], "image/png").await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("images/c").await.unwrap(), Some(vec![3]));
        assert_eq!(store.get("images/b").await.unwrap(), None);
        assert!(store.delete("images/a").await.unwrap());
        assert!(!store.delete("images/a").await.unwrap());
    }
}
