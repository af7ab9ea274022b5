use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::request::{GenerationRequest, MediaKind, Quality, Style};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGenerationSet {
    pub user_id: String,
    pub model: String,
    pub prompt: String,
}

/// Grouping container for the artifacts produced by one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSet {
    pub id: Uuid,
    pub user_id: String,
    pub model: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters echoed onto every artifact so a result can be reproduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub seed: Option<u64>,
    pub guidance_scale: Option<f32>,
    pub steps: Option<u32>,
    pub quality: Option<Quality>,
    pub style: Option<Style>,
    pub upsample: bool,
    pub duration_secs: Option<u32>,
    pub looped: bool,
}

impl From<&GenerationRequest> for GenerationParams {
    fn from(request: &GenerationRequest) -> Self {
        GenerationParams {
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            model: request.model.clone(),
            width: request.dimensions.width,
            height: request.dimensions.height,
            seed: request.seed,
            guidance_scale: request.guidance_scale,
            steps: request.steps,
            quality: request.quality,
            style: request.style,
            upsample: request.upsample,
            duration_secs: request.duration_secs,
            looped: request.looped,
        }
    }
}

impl GenerationParams {
    pub fn for_unit(request: &GenerationRequest, unit: usize) -> Self {
        GenerationParams {
            seed: request.unit_seed(unit),
            ..GenerationParams::from(request)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArtifact {
    pub set_id: Uuid,
    pub kind: MediaKind,
    pub params: GenerationParams,
    pub content_type: String,
    pub byte_size: u64,
}

/// Metadata row for a stored image or video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub id: Uuid,
    pub set_id: Uuid,
    pub kind: MediaKind,
    pub params: GenerationParams,
    pub content_type: String,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn storage_key(&self) -> String {
        storage_key(self.kind, self.id)
    }
}

/// Object-store key for an artifact. Never persisted; always rebuilt from the id.
pub fn storage_key(kind: MediaKind, id: Uuid) -> String {
    format!("{}/{}", kind.key_prefix(), id)
}

/// An artifact as returned to callers, with its derived locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(flatten)]
    pub record: ArtifactRecord,
    pub url: String,
    pub thumbnail_url: String,
}

impl Artifact {
    pub fn id(&self) -> Uuid {
        self.record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_is_derived_from_kind_and_id() {
        let id = Uuid::new_v4();
        assert_eq!(storage_key(MediaKind::Image, id), format!("images/{}", id));
        assert_eq!(storage_key(MediaKind::Video, id), format!("videos/{}", id));
    }

    #[test]
    fn params_echo_request() {
        let request = GenerationRequest::new("a red fox", "flux-dev")
            .with_seed(42)
            .with_dimensions(768, 512)
            .with_style(Style::Anime);
        let params = GenerationParams::from(&request);
        assert_eq!(params.seed, Some(42));
        assert_eq!((params.width, params.height), (768, 512));
        assert_eq!(params.style, Some(Style::Anime));
        assert_eq!(params.model, "flux-dev");

        assert_eq!(GenerationParams::for_unit(&request, 3).seed, Some(45));
    }
}
