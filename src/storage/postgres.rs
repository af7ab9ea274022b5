use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::{
    config::PostgresConfig,
    error::{GenerationError, Result},
    models::{ArtifactRecord, GenerationSet, MediaKind, NewArtifact, NewGenerationSet},
    storage::traits::MetadataStore,
};

pub struct PostgresMetadataStore {
    pool: Pool,
}

impl PostgresMetadataStore {
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = config.host;
        cfg.port = config.port;
        cfg.user = config.username;
        cfg.password = config.password;
        cfg.dbname = config.database;

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| GenerationError::Configuration(format!("Failed to create pool: {}", e)))?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;

        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS generation_sets (
                    id UUID PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    model TEXT NOT NULL,
                    prompt TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE TABLE IF NOT EXISTS artifacts (
                    id UUID PRIMARY KEY,
                    set_id UUID NOT NULL REFERENCES generation_sets(id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    params JSONB NOT NULL DEFAULT '{}',
                    content_type TEXT NOT NULL,
                    byte_size BIGINT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS idx_artifacts_set_id ON artifacts(set_id);
                CREATE INDEX IF NOT EXISTS idx_generation_sets_user ON generation_sets(user_id);",
            )
            .await?;

        log::info!("PostgreSQL generation schema initialized");
        Ok(())
    }
}

fn set_from_row(row: &Row) -> GenerationSet {
    GenerationSet {
        id: row.get("id"),
        user_id: row.get("user_id"),
        model: row.get("model"),
        prompt: row.get("prompt"),
        created_at: row.get("created_at"),
    }
}

fn artifact_from_row(row: &Row) -> Result<ArtifactRecord> {
    let kind: String = row.get("kind");
    let params: serde_json::Value = row.get("params");
    let byte_size: i64 = row.get("byte_size");

    Ok(ArtifactRecord {
        id: row.get("id"),
        set_id: row.get("set_id"),
        kind: MediaKind::parse(&kind)
            .ok_or_else(|| GenerationError::Persistence(format!("Unknown artifact kind: {}", kind)))?,
        params: serde_json::from_value(params)?,
        content_type: row.get("content_type"),
        byte_size: byte_size.max(0) as u64,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn create_set(&self, set: NewGenerationSet) -> Result<GenerationSet> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();

        let row = client
            .query_one(
                "INSERT INTO generation_sets (id, user_id, model, prompt, created_at)
                 VALUES ($1, $2, $3, $4, NOW())
                 RETURNING id, user_id, model, prompt, created_at",
                &[&id, &set.user_id, &set.model, &set.prompt],
            )
            .await?;

        Ok(set_from_row(&row))
    }

    async fn get_set(&self, id: Uuid) -> Result<Option<GenerationSet>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, user_id, model, prompt, created_at FROM generation_sets WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(set_from_row))
    }

    async fn delete_set(&self, id: Uuid) -> Result<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM generation_sets WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn create_artifact(&self, artifact: NewArtifact) -> Result<ArtifactRecord> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        let params = serde_json::to_value(&artifact.params)?;
        let byte_size = i64::try_from(artifact.byte_size).map_err(|_| {
            GenerationError::Persistence(format!("Artifact too large: {} bytes", artifact.byte_size))
        })?;

        let row = client
            .query_one(
                "INSERT INTO artifacts (id, set_id, kind, params, content_type, byte_size, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, NOW())
                 RETURNING id, set_id, kind, params, content_type, byte_size, created_at",
                &[
                    &id,
                    &artifact.set_id,
                    &artifact.kind.as_str(),
                    &params,
                    &artifact.content_type,
                    &byte_size,
                ],
            )
            .await?;

        artifact_from_row(&row)
    }

    async fn delete_artifact(&self, id: Uuid) -> Result<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM artifacts WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn list_artifacts(&self, set_id: Uuid) -> Result<Vec<ArtifactRecord>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, set_id, kind, params, content_type, byte_size, created_at
                 FROM artifacts WHERE set_id = $1 ORDER BY created_at, id",
                &[&set_id],
            )
            .await?;

        rows.iter().map(artifact_from_row).collect()
    }

    async fn health_check(&self) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client.query_one("SELECT NOW()", &[]).await?;
        let _now: DateTime<Utc> = row.get(0);
        Ok(true)
    }
}
