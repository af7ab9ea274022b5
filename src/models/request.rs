use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};
use crate::models::catalog::ModelSpec;

pub const MAX_QUANTITY: u32 = 10;
pub const MAX_PROMPT_CHARS: usize = 2000;
pub const MAX_GUIDANCE_SCALE: f32 = 20.0;
pub const MAX_STEPS: u32 = 50;
pub const MAX_VIDEO_SECONDS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// Object-store prefix for artifacts of this kind.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        }
    }

    pub fn default_content_type(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/png",
            MediaKind::Video => "video/mp4",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Standard,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Natural,
    Photographic,
    Cinematic,
    Anime,
    DigitalArt,
}

impl Style {
    pub fn prompt_suffix(&self) -> &'static str {
        match self {
            Style::Natural => "",
            Style::Photographic => ", photographic, realistic lighting",
            Style::Cinematic => ", cinematic still, dramatic lighting",
            Style::Anime => ", anime style illustration",
            Style::DigitalArt => ", digital art",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Dimensions {
            width: 1024,
            height: 1024,
        }
    }
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    /// Pick the provider bucket ("16:9", "1:1", ...) closest to these dimensions.
    pub fn nearest_aspect_ratio<'a>(&self, buckets: &[&'a str]) -> Option<&'a str> {
        let target = self.ratio().ln();
        buckets
            .iter()
            .filter_map(|bucket| parse_ratio(bucket).map(|r| (*bucket, (r.ln() - target).abs())))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(bucket, _)| bucket)
    }
}

fn parse_ratio(bucket: &str) -> Option<f64> {
    let (w, h) = bucket.split_once(':')?;
    let w: f64 = w.trim().parse().ok()?;
    let h: f64 = h.trim().parse().ok()?;
    (w > 0.0 && h > 0.0).then(|| w / h)
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    pub model: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub quality: Option<Quality>,
    #[serde(default)]
    pub style: Option<Style>,
    #[serde(default)]
    pub upsample: bool,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub looped: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            model: model.into(),
            quantity: 1,
            dimensions: Dimensions::default(),
            seed: None,
            guidance_scale: None,
            steps: None,
            quality: None,
            style: None,
            upsample: false,
            duration_secs: None,
            looped: false,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Dimensions::new(width, height);
        self
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_guidance_scale(mut self, scale: f32) -> Self {
        self.guidance_scale = Some(scale);
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_upsample(mut self, upsample: bool) -> Self {
        self.upsample = upsample;
        self
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Seed for one unit of the batch, so units differ but stay reproducible.
    pub fn unit_seed(&self, unit: usize) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(unit as u64))
    }

    /// Prompt with the style hint appended, as sent to providers without a style field.
    pub fn styled_prompt(&self) -> String {
        match self.style {
            Some(style) => format!("{}{}", self.prompt.trim(), style.prompt_suffix()),
            None => self.prompt.trim().to_string(),
        }
    }

    /// Reject anything that would be refused by the provider or cost money for nothing.
    pub fn validate(&self, spec: &ModelSpec) -> Result<()> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::Validation("Prompt must not be empty".into()));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(GenerationError::Validation(format!(
                "Prompt exceeds {} characters",
                MAX_PROMPT_CHARS
            )));
        }
        if let Some(negative) = &self.negative_prompt {
            if negative.chars().count() > MAX_PROMPT_CHARS {
                return Err(GenerationError::Validation(format!(
                    "Negative prompt exceeds {} characters",
                    MAX_PROMPT_CHARS
                )));
            }
        }

        let max_quantity = spec.max_quantity.min(MAX_QUANTITY);
        if self.quantity == 0 || self.quantity > max_quantity {
            return Err(GenerationError::Validation(format!(
                "Quantity must be between 1 and {} for {}",
                max_quantity, spec.id
            )));
        }

        let Dimensions { width, height } = self.dimensions;
        for (name, side) in [("width", width), ("height", height)] {
            if side < spec.min_side || side > spec.max_side {
                return Err(GenerationError::Validation(format!(
                    "{} {} is outside {}..={} for {}",
                    name, side, spec.min_side, spec.max_side, spec.id
                )));
            }
            if side % spec.dimension_multiple != 0 {
                return Err(GenerationError::Validation(format!(
                    "{} {} must be a multiple of {} for {}",
                    name, side, spec.dimension_multiple, spec.id
                )));
            }
        }

        if let Some(scale) = self.guidance_scale {
            if !(1.0..=MAX_GUIDANCE_SCALE).contains(&scale) {
                return Err(GenerationError::Validation(format!(
                    "Guidance scale must be between 1.0 and {}",
                    MAX_GUIDANCE_SCALE
                )));
            }
        }
        if let Some(steps) = self.steps {
            if steps == 0 || steps > MAX_STEPS {
                return Err(GenerationError::Validation(format!(
                    "Step count must be between 1 and {}",
                    MAX_STEPS
                )));
            }
        }

        match (spec.kind, self.duration_secs) {
            (MediaKind::Image, Some(_)) => {
                return Err(GenerationError::Validation(format!(
                    "{} generates images; duration is not supported",
                    spec.id
                )));
            }
            (MediaKind::Video, Some(secs)) if secs == 0 || secs > MAX_VIDEO_SECONDS => {
                return Err(GenerationError::Validation(format!(
                    "Video duration must be between 1 and {} seconds",
                    MAX_VIDEO_SECONDS
                )));
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::find_model;

    fn flux() -> &'static ModelSpec {
        find_model("flux-pro-1.1").unwrap()
    }

    #[test]
    fn accepts_reasonable_request() {
        let request = GenerationRequest::new("a red fox", "flux-pro-1.1")
            .with_quantity(4)
            .with_dimensions(1024, 768)
            .with_guidance_scale(3.5)
            .with_steps(28);
        assert!(request.validate(flux()).is_ok());
    }

    #[test]
    fn rejects_blank_prompt() {
        let request = GenerationRequest::new("   ", "flux-pro-1.1");
        let err = request.validate(flux()).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[test]
    fn rejects_quantity_out_of_range() {
        for quantity in [0, 11] {
            let request = GenerationRequest::new("fox", "flux-pro-1.1").with_quantity(quantity);
            assert!(request.validate(flux()).is_err(), "quantity {}", quantity);
        }
    }

    #[test]
    fn rejects_dimensions_outside_bounds() {
        let too_big = GenerationRequest::new("fox", "flux-pro-1.1").with_dimensions(4096, 1024);
        assert!(too_big.validate(flux()).is_err());

        let misaligned = GenerationRequest::new("fox", "flux-pro-1.1").with_dimensions(1000, 1024);
        assert!(misaligned.validate(flux()).is_err());
    }

    #[test]
    fn rejects_duration_on_image_model() {
        let request = GenerationRequest::new("fox", "flux-pro-1.1").with_duration(5);
        assert!(request.validate(flux()).is_err());
    }

    #[test]
    fn nearest_bucket() {
        let buckets = ["1:1", "16:9", "9:16", "4:3"];
        assert_eq!(
            Dimensions::new(1920, 1080).nearest_aspect_ratio(&buckets),
            Some("16:9")
        );
        assert_eq!(
            Dimensions::new(1024, 1024).nearest_aspect_ratio(&buckets),
            Some("1:1")
        );
        assert_eq!(
            Dimensions::new(768, 1344).nearest_aspect_ratio(&buckets),
            Some("9:16")
        );
        assert_eq!(Dimensions::new(1024, 1024).nearest_aspect_ratio(&[]), None);
    }

    #[test]
    fn deserializes_with_defaults() {
        let request: GenerationRequest =
            serde_json::from_str(r#"{"prompt":"a red fox","model":"mock-provider"}"#).unwrap();
        assert_eq!(request.quantity, 1);
        assert_eq!(request.dimensions, Dimensions::default());
        assert!(!request.upsample);
    }
}
