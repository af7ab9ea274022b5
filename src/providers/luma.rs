use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::LumaConfig,
    error::{looks_moderated, GenerationError, Result},
    models::{Dimensions, GenerationRequest, MediaKind, ModelSpec, ProviderKind},
    polling::PollConfig,
    providers::{
        http,
        traits::{PollStatus, ProviderAdapter, ResultPayload, Submission},
    },
};

const PROVIDER: &str = "luma";

pub const LUMA_STATES: &[&str] = &["queued", "dreaming", "completed", "failed"];

#[derive(Debug, Deserialize)]
struct Generation {
    id: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    assets: Option<Assets>,
}

#[derive(Debug, Deserialize)]
struct Assets {
    video: Option<String>,
}

/// Luma Dream Machine video generation.
pub struct LumaAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    spec: &'static ModelSpec,
}

impl LumaAdapter {
    pub fn new(config: &LumaConfig, spec: &'static ModelSpec, call_timeout: Duration) -> Result<Self> {
        if spec.provider != ProviderKind::Luma || spec.kind != MediaKind::Video {
            return Err(GenerationError::Configuration(format!(
                "{} is not a Luma video model",
                spec.id
            )));
        }
        if spec.aspect_ratios.is_empty() {
            return Err(GenerationError::Configuration(format!(
                "{} has no aspect ratio buckets",
                spec.id
            )));
        }
        let api_key = http::require_key("Luma", &config.api_key)?;

        Ok(Self {
            client: http::build_client(call_timeout)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            spec,
        })
    }

    fn build_payload(&self, request: &GenerationRequest) -> serde_json::Value {
        let aspect_ratio = request
            .dimensions
            .nearest_aspect_ratio(self.spec.aspect_ratios)
            .unwrap_or("16:9");
        let duration = match request.duration_secs {
            Some(secs) if secs > 5 => "9s",
            _ => "5s",
        };

        json!({
            "prompt": request.styled_prompt(),
            "model": self.spec.provider_model,
            "aspect_ratio": aspect_ratio,
            "resolution": resolution_for(request.dimensions),
            "duration": duration,
            "loop": request.looped,
        })
    }
}

fn resolution_for(dimensions: Dimensions) -> &'static str {
    match dimensions.width.max(dimensions.height) {
        0..=960 => "540p",
        961..=1280 => "720p",
        1281..=1920 => "1080p",
        _ => "4k",
    }
}

pub fn classify_state(
    state: &str,
    video: Option<String>,
    failure_reason: Option<String>,
) -> PollStatus {
    match state {
        "queued" | "dreaming" => PollStatus::pending(),
        "completed" => match video {
            Some(url) => PollStatus::succeeded(url),
            None => PollStatus::failed("completed without a video asset"),
        },
        "failed" => {
            let reason = failure_reason.unwrap_or_else(|| "generation failed".to_string());
            if looks_moderated(&reason) {
                PollStatus::moderated(reason)
            } else {
                PollStatus::failed(reason)
            }
        }
        other => PollStatus::failed(format!("unrecognized state '{}'", other)),
    }
}

#[async_trait]
impl ProviderAdapter for LumaAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Luma
    }

    fn model(&self) -> &'static ModelSpec {
        self.spec
    }

    fn polling(&self) -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_secs(3),
            multiplier: 1.5,
            max_delay: Duration::from_secs(5),
            max_attempts: 150,
            max_wait: Duration::from_secs(600),
        }
    }

    async fn submit(&self, request: &GenerationRequest, unit: usize) -> Result<Submission> {
        let payload = self.build_payload(request);
        log::info!("Submitting {} unit {} to Luma", self.spec.provider_model, unit);
        log::debug!("Luma request payload: {}", payload);

        let response = self
            .client
            .post(format!("{}/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest(PROVIDER, e))?;

        let generation: Generation = http::read_json(PROVIDER, response).await?;
        if generation.state.as_deref() == Some("failed") {
            let reason = generation
                .failure_reason
                .unwrap_or_else(|| "rejected at submission".to_string());
            return Err(if looks_moderated(&reason) {
                GenerationError::ContentModerated {
                    provider: PROVIDER.to_string(),
                    detail: reason,
                }
            } else {
                GenerationError::SubmissionRejected {
                    provider: PROVIDER.to_string(),
                    status: None,
                    message: reason,
                }
            });
        }
        Ok(Submission::Job(generation.id))
    }

    async fn poll_status(&self, job_id: &str) -> Result<PollStatus> {
        let response = self
            .client
            .get(format!("{}/generations/{}", self.base_url, job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest(PROVIDER, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(PollStatus::not_found());
        }
        let generation: Generation = http::read_json(PROVIDER, response).await?;
        let video = generation.assets.and_then(|a| a.video);
        Ok(classify_state(
            generation.state.as_deref().unwrap_or("unknown"),
            video,
            generation.failure_reason,
        ))
    }

    async fn fetch_result(&self, result_ref: &str) -> Result<ResultPayload> {
        http::download(&self.client, PROVIDER, result_ref, MediaKind::Video).await
    }
}
