use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::GenerationError,
    models::{Artifact, GenerationParams, GenerationRequest, MediaKind, NewArtifact},
    providers::ResultPayload,
    storage::{MetadataStore, ObjectStore},
    urls::UrlDeriver,
};

/// A failed store. `orphaned` names a metadata row that was written but
/// whose binary never landed; the caller owns deleting it.
#[derive(Debug)]
pub struct PersistFailure {
    pub orphaned: Option<Uuid>,
    pub error: GenerationError,
}

impl PersistFailure {
    fn before_row(error: GenerationError) -> Self {
        Self {
            orphaned: None,
            error,
        }
    }
}

/// Writes the metadata row, then the binary under the row's derived key.
#[derive(Clone)]
pub struct ArtifactPersister {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    urls: UrlDeriver,
}

impl ArtifactPersister {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        urls: UrlDeriver,
    ) -> Self {
        Self {
            metadata,
            objects,
            urls,
        }
    }

    pub async fn store(
        &self,
        set_id: Uuid,
        kind: MediaKind,
        request: &GenerationRequest,
        unit: usize,
        payload: ResultPayload,
    ) -> Result<Artifact, PersistFailure> {
        let row = self
            .metadata
            .create_artifact(NewArtifact {
                set_id,
                kind,
                params: GenerationParams::for_unit(request, unit),
                content_type: payload.content_type.clone(),
                byte_size: payload.bytes.len() as u64,
            })
            .await
            .map_err(|e| PersistFailure::before_row(as_persistence(e)))?;

        let key = row.storage_key();
        if let Err(e) = self
            .objects
            .put(&key, payload.bytes, &payload.content_type)
            .await
        {
            return Err(PersistFailure {
                orphaned: Some(row.id),
                error: as_persistence(e),
            });
        }

        log::debug!("Stored unit {} as {}", unit, key);
        Ok(self.urls.artifact(row))
    }
}

fn as_persistence(err: GenerationError) -> GenerationError {
    match err {
        GenerationError::Persistence(_) => err,
        other => GenerationError::Persistence(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewGenerationSet;
    use crate::storage::{MemoryMetadataStore, MemoryObjectStore};

    type Setup = (
        Arc<MemoryMetadataStore>,
        Arc<MemoryObjectStore>,
        ArtifactPersister,
        Uuid,
    );

    async fn setup(objects: MemoryObjectStore) -> Setup {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let objects = Arc::new(objects);
        let persister =
            ArtifactPersister::new(metadata.clone(), objects.clone(), UrlDeriver::default());
        let set = metadata
            .create_set(NewGenerationSet {
                user_id: "u".into(),
                model: "mock-provider".into(),
                prompt: "a red fox".into(),
            })
            .await
            .unwrap();
        (metadata, objects, persister, set.id)
    }

    #[tokio::test]
    async fn stores_binary_under_row_key() {
        let (metadata, objects, persister, set_id) = setup(MemoryObjectStore::new()).await;
        let request = GenerationRequest::new("a red fox", "mock-provider").with_seed(10);

        let artifact = persister
            .store(
                set_id,
                MediaKind::Image,
                &request,
                2,
                ResultPayload::new(vec![1, 2, 3], "image/png"),
            )
            .await
            .unwrap();

        let key = format!("images/{}", artifact.id());
        assert_eq!(objects.get(&key).await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(artifact.record.byte_size, 3);
        assert_eq!(artifact.record.params.seed, Some(12));
        assert!(artifact.url.ends_with(&key));
        assert_eq!(metadata.list_artifacts(set_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_put_reports_orphaned_row() {
        let (metadata, _objects, persister, set_id) =
            setup(MemoryObjectStore::new().fail_puts([0])).await;
        let request = GenerationRequest::new("a red fox", "mock-provider");

        let failure = persister
            .store(set_id, MediaKind::Image, &request, 0, ResultPayload::new(vec![1], "image/png"))
            .await
            .unwrap_err();

        let rows = metadata.list_artifacts(set_id).await.unwrap();
        assert_eq!(failure.orphaned, Some(rows[0].id));
        assert!(matches!(failure.error, GenerationError::Persistence(_)));
    }

    #[tokio::test]
    async fn failed_row_leaves_nothing_behind() {
        let (_metadata, objects, persister, _) = setup(MemoryObjectStore::new()).await;
        let request = GenerationRequest::new("a red fox", "mock-provider");

        let failure = persister
            .store(
                Uuid::new_v4(),
                MediaKind::Image,
                &request,
                0,
                ResultPayload::new(vec![1], "image/png"),
            )
            .await
            .unwrap_err();

        assert!(failure.orphaned.is_none());
        assert!(objects.is_empty());
    }
}
