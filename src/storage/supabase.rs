use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};

use crate::{
    error::{GenerationError, Result},
    providers::http::build_client,
    storage::traits::ObjectStore,
};

/// Supabase Storage bucket accessed over its REST API with a service key.
pub struct SupabaseObjectStore {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseObjectStore {
    pub fn new(
        url: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
        call_timeout: Duration,
    ) -> Result<Self> {
        let url = url.into();
        let service_key = service_key.into();
        let bucket = bucket.into();
        if url.trim().is_empty() {
            return Err(GenerationError::Configuration("Supabase URL is required".into()));
        }
        if service_key.trim().is_empty() {
            return Err(GenerationError::Configuration(
                "Supabase service key is required".into(),
            ));
        }

        Ok(Self {
            client: build_client(call_timeout)?,
            base_url: url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn failure(&self, action: &str, key: &str, response: reqwest::Response) -> GenerationError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        GenerationError::Persistence(format!(
            "Supabase {} {} failed ({}): {}",
            action, key, status, body
        ))
    }
}

fn transport(action: &str, key: &str, e: reqwest::Error) -> GenerationError {
    GenerationError::Persistence(format!("Supabase {} {} failed: {}", action, key, e))
}

#[async_trait]
impl ObjectStore for SupabaseObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .authorized(self.client.post(self.object_url(key)))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport("upload", key, e))?;

        if !response.status().is_success() {
            return Err(self.failure("upload", key, response).await);
        }
        log::debug!("Uploaded {} to bucket {}", key, self.bucket);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .authorized(self.client.get(self.object_url(key)))
            .send()
            .await
            .map_err(|e| transport("download", key, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| transport("download", key, e))?;
                Ok(Some(bytes.to_vec()))
            }
            _ => Err(self.failure("download", key, response).await),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let response = self
            .authorized(self.client.delete(self.object_url(key)))
            .send()
            .await
            .map_err(|e| transport("delete", key, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(self.failure("delete", key, response).await),
        }
    }
}
