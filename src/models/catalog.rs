use serde::{Deserialize, Serialize};

use crate::models::request::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Titan,
    Flux,
    Luma,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Titan => "titan",
            ProviderKind::Flux => "flux",
            ProviderKind::Luma => "luma",
            ProviderKind::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a model a user can pick.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub id: &'static str,
    /// Identifier the provider's API expects.
    pub provider_model: &'static str,
    pub provider: ProviderKind,
    pub kind: MediaKind,
    pub cost_per_unit: u32,
    pub max_quantity: u32,
    pub min_side: u32,
    pub max_side: u32,
    pub dimension_multiple: u32,
    /// Non-empty for providers that take an aspect ratio instead of pixels.
    pub aspect_ratios: &'static [&'static str],
}

const WIDE_RATIOS: &[&str] = &["21:9", "16:9", "4:3", "1:1", "3:4", "9:16", "9:21"];

pub const TITAN_IMAGE_V1: ModelSpec = ModelSpec {
    id: "titan-image-v1",
    provider_model: "amazon.titan-image-generator-v1",
    provider: ProviderKind::Titan,
    kind: MediaKind::Image,
    cost_per_unit: 1,
    max_quantity: 10,
    min_side: 320,
    max_side: 1408,
    dimension_multiple: 64,
    aspect_ratios: &[],
};

pub const TITAN_IMAGE_V2: ModelSpec = ModelSpec {
    id: "titan-image-v2",
    provider_model: "amazon.titan-image-generator-v2:0",
    provider: ProviderKind::Titan,
    kind: MediaKind::Image,
    cost_per_unit: 2,
    max_quantity: 10,
    min_side: 320,
    max_side: 1408,
    dimension_multiple: 64,
    aspect_ratios: &[],
};

pub const FLUX_DEV: ModelSpec = ModelSpec {
    id: "flux-dev",
    provider_model: "flux-dev",
    provider: ProviderKind::Flux,
    kind: MediaKind::Image,
    cost_per_unit: 2,
    max_quantity: 10,
    min_side: 256,
    max_side: 1440,
    dimension_multiple: 32,
    aspect_ratios: &[],
};

pub const FLUX_PRO_1_1: ModelSpec = ModelSpec {
    id: "flux-pro-1.1",
    provider_model: "flux-pro-1.1",
    provider: ProviderKind::Flux,
    kind: MediaKind::Image,
    cost_per_unit: 4,
    max_quantity: 10,
    min_side: 256,
    max_side: 1440,
    dimension_multiple: 32,
    aspect_ratios: &[],
};

pub const FLUX_PRO_1_1_ULTRA: ModelSpec = ModelSpec {
    id: "flux-pro-1.1-ultra",
    provider_model: "flux-pro-1.1-ultra",
    provider: ProviderKind::Flux,
    kind: MediaKind::Image,
    cost_per_unit: 6,
    max_quantity: 10,
    min_side: 256,
    max_side: 2752,
    dimension_multiple: 32,
    aspect_ratios: WIDE_RATIOS,
};

pub const LUMA_RAY_2: ModelSpec = ModelSpec {
    id: "luma-ray-2",
    provider_model: "ray-2",
    provider: ProviderKind::Luma,
    kind: MediaKind::Video,
    cost_per_unit: 20,
    max_quantity: 4,
    min_side: 256,
    max_side: 1920,
    dimension_multiple: 1,
    aspect_ratios: WIDE_RATIOS,
};

pub const LUMA_RAY_FLASH_2: ModelSpec = ModelSpec {
    id: "luma-ray-flash-2",
    provider_model: "ray-flash-2",
    provider: ProviderKind::Luma,
    kind: MediaKind::Video,
    cost_per_unit: 10,
    max_quantity: 4,
    min_side: 256,
    max_side: 1920,
    dimension_multiple: 1,
    aspect_ratios: WIDE_RATIOS,
};

pub const MOCK_PROVIDER: ModelSpec = ModelSpec {
    id: "mock-provider",
    provider_model: "mock",
    provider: ProviderKind::Mock,
    kind: MediaKind::Image,
    cost_per_unit: 1,
    max_quantity: 10,
    min_side: 64,
    max_side: 4096,
    dimension_multiple: 1,
    aspect_ratios: &[],
};

pub const MODELS: &[&ModelSpec] = &[
    &TITAN_IMAGE_V1,
    &TITAN_IMAGE_V2,
    &FLUX_DEV,
    &FLUX_PRO_1_1,
    &FLUX_PRO_1_1_ULTRA,
    &LUMA_RAY_2,
    &LUMA_RAY_FLASH_2,
    &MOCK_PROVIDER,
];

pub fn find_model(id: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().copied().find(|spec| spec.id == id)
}

pub fn models_for(provider: ProviderKind) -> impl Iterator<Item = &'static ModelSpec> {
    MODELS
        .iter()
        .copied()
        .filter(move |spec| spec.provider == provider)
}
