pub mod local;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod supabase;
pub mod traits;

use std::sync::Arc;

use crate::{
    config::{AppConfig, StorageBackend},
    error::{GenerationError, Result},
};

pub use local::LocalObjectStore;
pub use memory::{MemoryMetadataStore, MemoryObjectStore};
#[cfg(feature = "postgres")]
pub use postgres::PostgresMetadataStore;
pub use supabase::SupabaseObjectStore;
pub use traits::{MetadataStore, ObjectStore};

/// The pair of stores a coordinator writes to.
#[derive(Clone)]
pub struct Stores {
    pub metadata: Arc<dyn MetadataStore>,
    pub objects: Arc<dyn ObjectStore>,
}

impl Stores {
    pub fn new(metadata: Arc<dyn MetadataStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { metadata, objects }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryObjectStore::new()),
        )
    }

    /// Pick backends from configuration. Without Postgres configured the
    /// metadata lives in memory for the lifetime of the process.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let metadata: Arc<dyn MetadataStore> = match &config.postgres {
            Some(postgres_config) => {
                #[cfg(feature = "postgres")]
                {
                    Arc::new(PostgresMetadataStore::new(postgres_config.clone()).await?)
                }
                #[cfg(not(feature = "postgres"))]
                {
                    let _ = postgres_config;
                    return Err(GenerationError::Configuration(
                        "PostgreSQL feature not enabled".into(),
                    ));
                }
            }
            None => {
                log::warn!("No PostgreSQL configured, generation metadata is kept in memory");
                Arc::new(MemoryMetadataStore::new())
            }
        };

        let objects: Arc<dyn ObjectStore> = match &config.storage.backend {
            StorageBackend::Local { root } => Arc::new(LocalObjectStore::new(root.clone()).await?),
            StorageBackend::Supabase {
                url,
                service_key,
                bucket,
            } => Arc::new(SupabaseObjectStore::new(
                url.as_str(),
                service_key.as_str(),
                bucket.as_str(),
                config.call_timeout(),
            )?),
        };

        if !metadata.health_check().await? {
            return Err(GenerationError::Persistence(
                "Metadata store failed its health check".into(),
            ));
        }

        Ok(Self { metadata, objects })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[tokio::test]
    async fn local_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            AppConfig::new().with_storage(StorageConfig::new().with_local_root(dir.path()));
        let stores = Stores::from_config(&config).await.unwrap();

        stores.objects.put("images/x", vec![1, 2], "image/png").await.unwrap();
        assert_eq!(stores.objects.get("images/x").await.unwrap(), Some(vec![1, 2]));
        assert!(stores.metadata.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn supabase_backend_requires_key() {
        let config = AppConfig::new().with_storage(StorageConfig::new().with_supabase(
            "https://x.supabase.co",
            "",
            "media",
        ));
        assert!(matches!(
            Stores::from_config(&config).await,
            Err(GenerationError::Configuration(_))
        ));
    }
}
