use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    config::FluxConfig,
    error::{GenerationError, Result},
    models::{GenerationRequest, ModelSpec, ProviderKind, Style},
    polling::PollConfig,
    providers::{
        http,
        traits::{PollStatus, ProviderAdapter, ResultPayload, Submission},
    },
};

const PROVIDER: &str = "flux";

/// Every status string the result endpoint is documented to return.
pub const FLUX_STATUSES: &[&str] = &[
    "Ready",
    "Pending",
    "Queued",
    "Processing",
    "Request Moderated",
    "Content Moderated",
    "Error",
    "Failed",
    "Task not found",
];

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    status: String,
    #[serde(default)]
    result: Option<ResultSample>,
    #[serde(default)]
    details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResultSample {
    sample: Option<String>,
}

/// Black Forest Labs FLUX image API: submit, then poll `get_result`.
pub struct FluxAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    spec: &'static ModelSpec,
}

impl FluxAdapter {
    pub fn new(config: &FluxConfig, spec: &'static ModelSpec, call_timeout: Duration) -> Result<Self> {
        if spec.provider != ProviderKind::Flux {
            return Err(GenerationError::Configuration(format!(
                "{} is not a FLUX model",
                spec.id
            )));
        }
        let api_key = http::require_key("BFL", &config.api_key)?;

        Ok(Self {
            client: http::build_client(call_timeout)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            spec,
        })
    }

    fn build_payload(&self, request: &GenerationRequest, unit: usize) -> Value {
        let mut body = Map::new();
        body.insert("prompt".into(), json!(request.prompt.trim()));
        body.insert("output_format".into(), json!("png"));
        body.insert("safety_tolerance".into(), json!(2));

        if self.spec.aspect_ratios.is_empty() {
            body.insert("width".into(), json!(request.dimensions.width));
            body.insert("height".into(), json!(request.dimensions.height));
            body.insert("prompt_upsampling".into(), json!(request.upsample));
            if let Some(steps) = request.steps {
                body.insert("steps".into(), json!(steps));
            }
            if let Some(guidance) = request.guidance_scale {
                body.insert("guidance".into(), json!(guidance));
            }
        } else {
            let ratio = request
                .dimensions
                .nearest_aspect_ratio(self.spec.aspect_ratios)
                .unwrap_or("1:1");
            body.insert("aspect_ratio".into(), json!(ratio));
            body.insert("raw".into(), json!(request.style == Some(Style::Photographic)));
        }
        if let Some(seed) = request.unit_seed(unit) {
            body.insert("seed".into(), json!(seed));
        }

        Value::Object(body)
    }
}

/// Map a result status onto the normalized job states.
pub fn classify_status(status: &str, sample: Option<String>, details: Option<&Value>) -> PollStatus {
    let detail = || match details {
        Some(details) => format!("{}: {}", status, details),
        None => status.to_string(),
    };

    match status {
        "Ready" => match sample {
            Some(url) => PollStatus::succeeded(url),
            None => PollStatus::failed("Ready without a sample URL"),
        },
        "Pending" | "Queued" | "Processing" => PollStatus::pending(),
        "Request Moderated" | "Content Moderated" => PollStatus::moderated(detail()),
        "Error" | "Failed" => PollStatus::failed(detail()),
        "Task not found" => PollStatus::not_found(),
        other => PollStatus::failed(format!("unrecognized status '{}'", other)),
    }
}

#[async_trait]
impl ProviderAdapter for FluxAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Flux
    }

    fn model(&self) -> &'static ModelSpec {
        self.spec
    }

    fn polling(&self) -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(500),
            multiplier: 1.25,
            max_delay: Duration::from_millis(2500),
            max_attempts: 120,
            max_wait: Duration::from_secs(180),
        }
    }

    async fn submit(&self, request: &GenerationRequest, unit: usize) -> Result<Submission> {
        let payload = self.build_payload(request, unit);
        log::info!("Submitting {} unit {} to FLUX", self.spec.provider_model, unit);
        log::debug!("FLUX request payload: {}", payload);

        let response = self
            .client
            .post(format!("{}/{}", self.base_url, self.spec.provider_model))
            .header("x-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest(PROVIDER, e))?;

        let submitted: SubmitResponse = http::read_json(PROVIDER, response).await?;
        Ok(Submission::Job(submitted.id))
    }

    async fn poll_status(&self, job_id: &str) -> Result<PollStatus> {
        let response = self
            .client
            .get(format!("{}/get_result", self.base_url))
            .query(&[("id", job_id)])
            .header("x-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest(PROVIDER, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(PollStatus::not_found());
        }
        let result: ResultResponse = http::read_json(PROVIDER, response).await?;
        let sample = result.result.and_then(|r| r.sample);
        Ok(classify_status(&result.status, sample, result.details.as_ref()))
    }

    async fn fetch_result(&self, result_ref: &str) -> Result<ResultPayload> {
        http::download(&self.client, PROVIDER, result_ref, self.spec.kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{find_model, FLUX_PRO_1_1_ULTRA};
    use crate::providers::JobState;

    fn adapter(model: &str) -> FluxAdapter {
        FluxAdapter::new(
            &FluxConfig::new().with_api_key("test-key"),
            find_model(model).unwrap(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn every_documented_status_is_classified() {
        let expected = [
            ("Ready", JobState::Succeeded),
            ("Pending", JobState::Pending),
            ("Queued", JobState::Pending),
            ("Processing", JobState::Pending),
            ("Request Moderated", JobState::Moderated),
            ("Content Moderated", JobState::Moderated),
            ("Error", JobState::Failed),
            ("Failed", JobState::Failed),
            ("Task not found", JobState::NotFound),
        ];
        assert_eq!(expected.len(), FLUX_STATUSES.len());
        for (status, state) in expected {
            let polled = classify_status(status, Some("https://x/sample.png".into()), None);
            assert_eq!(polled.state, state, "status {}", status);
        }
    }

    #[test]
    fn unknown_status_is_terminal_failure() {
        let polled = classify_status("Warming Up", None, None);
        assert_eq!(polled.state, JobState::Failed);
        assert!(polled.error_detail.unwrap().contains("Warming Up"));
    }

    #[test]
    fn moderation_keeps_details() {
        let details = json!({"Moderation Reasons": ["Derivative Works Filter"]});
        let polled = classify_status("Content Moderated", None, Some(&details));
        assert_eq!(polled.state, JobState::Moderated);
        assert!(polled.error_detail.unwrap().contains("Derivative Works Filter"));
    }

    #[test]
    fn pixel_models_send_dimensions() {
        let request = GenerationRequest::new("a red fox", "flux-pro-1.1")
            .with_dimensions(1024, 768)
            .with_seed(7)
            .with_steps(30)
            .with_upsample(true);
        let payload = adapter("flux-pro-1.1").build_payload(&request, 2);
        assert_eq!(payload["width"], 1024);
        assert_eq!(payload["height"], 768);
        assert_eq!(payload["seed"], 9);
        assert_eq!(payload["steps"], 30);
        assert_eq!(payload["prompt_upsampling"], true);
        assert!(payload.get("aspect_ratio").is_none());
    }

    #[test]
    fn ultra_sends_aspect_ratio_bucket() {
        let request = GenerationRequest::new("a red fox", FLUX_PRO_1_1_ULTRA.id)
            .with_dimensions(2048, 1152)
            .with_style(Style::Photographic);
        let payload = adapter("flux-pro-1.1-ultra").build_payload(&request, 0);
        assert_eq!(payload["aspect_ratio"], "16:9");
        assert_eq!(payload["raw"], true);
        assert!(payload.get("width").is_none());
    }

    #[test]
    fn construction_fails_fast() {
        let no_key = FluxAdapter::new(
            &FluxConfig::new(),
            find_model("flux-dev").unwrap(),
            Duration::from_secs(5),
        );
        assert!(matches!(no_key, Err(GenerationError::Configuration(_))));

        let wrong_model = FluxAdapter::new(
            &FluxConfig::new().with_api_key("k"),
            find_model("luma-ray-2").unwrap(),
            Duration::from_secs(5),
        );
        assert!(matches!(wrong_model, Err(GenerationError::Configuration(_))));
    }
}
