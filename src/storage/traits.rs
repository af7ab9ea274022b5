use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{ArtifactRecord, GenerationSet, NewArtifact, NewGenerationSet},
};

/// Binary blob storage addressed by derived keys (`images/{id}`, `videos/{id}`).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Returns whether an object was removed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Relational store for generation sets and their artifact rows.
///
/// Artifacts reference their set; deleting a set removes its artifacts.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create_set(&self, set: NewGenerationSet) -> Result<GenerationSet>;

    async fn get_set(&self, id: Uuid) -> Result<Option<GenerationSet>>;

    async fn delete_set(&self, id: Uuid) -> Result<bool>;

    async fn create_artifact(&self, artifact: NewArtifact) -> Result<ArtifactRecord>;

    async fn delete_artifact(&self, id: Uuid) -> Result<bool>;

    /// Artifacts of a set, oldest first.
    async fn list_artifacts(&self, set_id: Uuid) -> Result<Vec<ArtifactRecord>>;

    async fn health_check(&self) -> Result<bool>;
}
