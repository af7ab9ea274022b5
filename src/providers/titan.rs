use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_bedrockruntime::{error::ProvideErrorMetadata, primitives::Blob, Client};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    config::BedrockConfig,
    error::{GenerationError, Result},
    models::{GenerationRequest, ModelSpec, ProviderKind, Quality},
    polling::PollConfig,
    providers::traits::{PollStatus, ProviderAdapter, ResultPayload, Submission},
};

const PROVIDER: &str = "titan";
const MAX_SEED: u64 = 2_147_483_646;

#[derive(Debug, Deserialize)]
struct TitanImageResponse {
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Amazon Titan image generation on Bedrock. Synchronous: every submit
/// returns the image directly.
pub struct TitanAdapter {
    client: Client,
    spec: &'static ModelSpec,
}

impl TitanAdapter {
    pub async fn new(
        config: &BedrockConfig,
        spec: &'static ModelSpec,
        call_timeout: Duration,
    ) -> Result<Self> {
        if spec.provider != ProviderKind::Titan {
            return Err(GenerationError::Configuration(format!(
                "{} is not a Titan model",
                spec.id
            )));
        }

        let mut loader = aws_config::from_env().timeout_config(call_timeouts(call_timeout));
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader
                .credentials_provider(aws_sdk_bedrockruntime::config::Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "rgenflow-titan",
                ))
                .region(aws_sdk_bedrockruntime::config::Region::new(
                    config
                        .region
                        .clone()
                        .unwrap_or_else(|| "us-east-1".to_string()),
                ));
        }
        let aws_config = loader.load().await;

        Ok(Self::with_client(Client::new(&aws_config), spec))
    }

    pub fn with_client(client: Client, spec: &'static ModelSpec) -> Self {
        Self { client, spec }
    }
}

/// Bounds each Bedrock invocation, retries included, by `call_timeout`.
fn call_timeouts(call_timeout: Duration) -> TimeoutConfig {
    TimeoutConfig::builder()
        .operation_timeout(call_timeout)
        .operation_attempt_timeout(call_timeout)
        .build()
}

fn build_payload(request: &GenerationRequest, unit: usize) -> Value {
    let mut text_params = json!({ "text": request.styled_prompt() });
    if let (Some(negative), Some(params)) =
        (&request.negative_prompt, text_params.as_object_mut())
    {
        params.insert("negativeText".into(), json!(negative));
    }

    let quality = match request.quality {
        Some(Quality::Premium) => "premium",
        _ => "standard",
    };
    let mut config = json!({
        "numberOfImages": 1,
        "quality": quality,
        "cfgScale": request.guidance_scale.unwrap_or(8.0).clamp(1.1, 10.0),
        "width": request.dimensions.width,
        "height": request.dimensions.height,
    });
    if let (Some(seed), Some(params)) = (request.unit_seed(unit), config.as_object_mut()) {
        params.insert("seed".into(), json!(seed % (MAX_SEED + 1)));
    }

    json!({
        "taskType": "TEXT_IMAGE",
        "textToImageParams": text_params,
        "imageGenerationConfig": config,
    })
}

/// Map a Bedrock service error code onto the taxonomy.
pub fn classify_service_error(code: &str, message: &str) -> GenerationError {
    match code {
        "ValidationException" if message.to_lowercase().contains("content filter") => {
            GenerationError::ContentModerated {
                provider: PROVIDER.to_string(),
                detail: message.to_string(),
            }
        }
        "AccessDeniedException" | "UnrecognizedClientException" => {
            GenerationError::Configuration(format!("Bedrock denied access: {}", message))
        }
        "ThrottlingException"
        | "ServiceUnavailableException"
        | "ModelTimeoutException"
        | "ModelNotReadyException"
        | "InternalServerException" => GenerationError::transient(PROVIDER, format!("{}: {}", code, message)),
        _ => GenerationError::SubmissionRejected {
            provider: PROVIDER.to_string(),
            status: None,
            message: format!("{}: {}", code, message),
        },
    }
}

#[async_trait]
impl ProviderAdapter for TitanAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Titan
    }

    fn model(&self) -> &'static ModelSpec {
        self.spec
    }

    fn polling(&self) -> PollConfig {
        PollConfig::default()
    }

    async fn submit(&self, request: &GenerationRequest, unit: usize) -> Result<Submission> {
        let payload = build_payload(request, unit);
        let request_json = serde_json::to_string(&payload)?;

        log::info!("Generating image with model: {}", self.spec.provider_model);

        let response = self
            .client
            .invoke_model()
            .model_id(self.spec.provider_model)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(request_json.into_bytes()))
            .send()
            .await
            .map_err(|e| {
                if let Some(service_error) = e.as_service_error() {
                    log::error!("Bedrock service error: {:?}", service_error.code());
                    classify_service_error(
                        service_error.code().unwrap_or("unknown"),
                        service_error.message().unwrap_or("no message"),
                    )
                } else {
                    GenerationError::transient(PROVIDER, format!("AWS SDK error: {}", e))
                }
            })?;

        let response_bytes = response.body.into_inner();
        let titan_response: TitanImageResponse = serde_json::from_slice(&response_bytes)?;

        if let Some(error) = titan_response.error {
            return Err(classify_service_error("ValidationException", &error));
        }
        let image = titan_response.images.into_iter().next().ok_or_else(|| {
            GenerationError::ProviderFailed {
                provider: PROVIDER.to_string(),
                detail: "No images generated".to_string(),
            }
        })?;
        let bytes = STANDARD
            .decode(image.as_bytes())
            .map_err(|e| GenerationError::ProviderFailed {
                provider: PROVIDER.to_string(),
                detail: format!("invalid base64 image: {}", e),
            })?;

        Ok(Submission::Immediate(ResultPayload::new(bytes, "image/png")))
    }

    async fn poll_status(&self, _job_id: &str) -> Result<PollStatus> {
        Ok(PollStatus::not_found())
    }

    async fn fetch_result(&self, result_ref: &str) -> Result<ResultPayload> {
        Err(GenerationError::Configuration(format!(
            "Titan returns images inline; nothing to fetch for {}",
            result_ref
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn invocations_are_bounded_by_call_timeout() {
        let timeouts = call_timeouts(Duration::from_secs(12));
        assert_eq!(timeouts.operation_timeout(), Some(Duration::from_secs(12)));
        assert_eq!(
            timeouts.operation_attempt_timeout(),
            Some(Duration::from_secs(12))
        );
    }

    #[test]
    fn payload_maps_tuning() {
        let request = GenerationRequest::new("a red fox", "titan-image-v1")
            .with_negative_prompt("blurry")
            .with_quality(Quality::Premium)
            .with_guidance_scale(15.0)
            .with_seed(MAX_SEED)
            .with_dimensions(768, 512);
        let payload = build_payload(&request, 1);

        assert_eq!(payload["taskType"], "TEXT_IMAGE");
        assert_eq!(payload["textToImageParams"]["negativeText"], "blurry");
        let config = &payload["imageGenerationConfig"];
        assert_eq!(config["quality"], "premium");
        assert_eq!(config["cfgScale"], 10.0);
        assert_eq!(config["width"], 768);
        assert_eq!(config["seed"], 0);
    }

    #[test]
    fn unseeded_request_omits_seed() {
        let request = GenerationRequest::new("a red fox", "titan-image-v1");
        let payload = build_payload(&request, 0);
        assert!(payload["imageGenerationConfig"].get("seed").is_none());
        assert_eq!(payload["imageGenerationConfig"]["cfgScale"], 8.0);
        assert!(payload["textToImageParams"].get("negativeText").is_none());
    }

    #[test]
    fn service_errors_map_to_taxonomy() {
        assert_eq!(
            classify_service_error(
                "ValidationException",
                "This request has been blocked by our content filters."
            )
            .kind(),
            ErrorKind::Moderated
        );
        assert_eq!(
            classify_service_error("ThrottlingException", "slow down").kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_service_error("AccessDeniedException", "no").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            classify_service_error("ValidationException", "width must be a multiple of 64").kind(),
            ErrorKind::Rejected
        );
    }
}
