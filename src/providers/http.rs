use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::{
    error::{GenerationError, Result},
    models::MediaKind,
    providers::traits::ResultPayload,
};

/// Shared client with the per-call timeout applied to every request.
pub fn build_client(call_timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(call_timeout)
        .connect_timeout(call_timeout.min(Duration::from_secs(10)))
        .build()
        .map_err(|e| GenerationError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Turn a non-2xx response into the matching taxonomy error.
pub async fn ensure_success(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GenerationError::from_status(provider, status.as_u16(), body))
}

pub async fn read_json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T> {
    let response = ensure_success(provider, response).await?;
    let text = response
        .text()
        .await
        .map_err(|e| GenerationError::from_reqwest(provider, e))?;
    serde_json::from_str(&text).map_err(|e| {
        GenerationError::transient(provider, format!("Unexpected response body: {} ({})", e, text))
    })
}

/// Download a finished result from a provider-hosted URL.
pub async fn download(
    client: &Client,
    provider: &str,
    url: &str,
    kind: MediaKind,
) -> Result<ResultPayload> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| GenerationError::from_reqwest(provider, e))?;
    let response = ensure_success(provider, response).await?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| value.starts_with(kind.as_str()))
        .unwrap_or_else(|| kind.default_content_type().to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| GenerationError::from_reqwest(provider, e))?;
    if bytes.is_empty() {
        return Err(GenerationError::ProviderFailed {
            provider: provider.to_string(),
            detail: format!("empty result downloaded from {}", url),
        });
    }

    log::debug!("Downloaded {} bytes ({}) from {}", bytes.len(), content_type, provider);
    Ok(ResultPayload::new(bytes.to_vec(), content_type))
}

pub fn require_key(provider: &str, key: &Option<String>) -> Result<String> {
    match key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(GenerationError::Configuration(format!(
            "{} API key is required",
            provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_configuration_error() {
        assert!(matches!(
            require_key("flux", &None),
            Err(GenerationError::Configuration(_))
        ));
        assert!(matches!(
            require_key("flux", &Some("  ".into())),
            Err(GenerationError::Configuration(_))
        ));
        assert_eq!(require_key("flux", &Some("k".into())).unwrap(), "k");
    }

    #[test]
    fn client_builds_with_timeout() {
        assert!(build_client(Duration::from_secs(5)).is_ok());
    }
}
