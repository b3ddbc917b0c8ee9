use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::adapters::{choose_model, require_text, require_url, ModelChoice};
use crate::error::{Error, Result};
use crate::providers::{ImageGeneration, ProviderClient};

pub const IMAGE_MODELS: &[(&str, &str)] = &[
    ("flux-schnell", "black-forest-labs/flux-schnell"),
    ("flux-dev", "black-forest-labs/flux-dev"),
    ("flux-pro", "black-forest-labs/flux-1.1-pro"),
    ("ideogram-v3", "ideogram-ai/ideogram-v3"),
    ("gpt-image-1", "openai/gpt-image-1"),
];

pub const DEFAULT_IMAGE_MODEL: &str = "flux-schnell";
pub const CREDITS_PER_IMAGE: i64 = 1;
pub const MAX_IMAGES: u32 = 4;

const ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3", "21:9"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMode {
    #[default]
    TextToImage,
    ImageToImage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRequest {
    pub prompt: Option<String>,
    #[serde(default = "default_aspect_ratio", alias = "aspectRatio")]
    pub aspect_ratio: String,
    pub model: Option<String>,
    #[serde(default)]
    pub mode: ImageMode,
    #[serde(alias = "referenceImage")]
    pub reference_image: Option<String>,
    #[serde(default = "default_count", alias = "n")]
    pub count: u32,
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: String,
    pub url: String,
    pub credit_cost: i64,
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: String,
    pub created_at: DateTime<Utc>,
}

impl ImageRequest {
    pub fn validate(&self) -> Result<()> {
        require_text("prompt", self.prompt.as_deref())?;
        if self.mode == ImageMode::ImageToImage {
            require_url("reference_image", self.reference_image.as_deref())?;
        }
        if !ASPECT_RATIOS.contains(&self.aspect_ratio.as_str()) {
            return Err(Error::validation(format!(
                "unsupported aspect ratio '{}'",
                self.aspect_ratio
            )));
        }
        if self.count == 0 || self.count > MAX_IMAGES {
            return Err(Error::validation(format!(
                "count must be between 1 and {}",
                MAX_IMAGES
            )));
        }
        Ok(())
    }

    pub fn model(&self) -> ModelChoice {
        choose_model(IMAGE_MODELS, self.model.as_deref(), DEFAULT_IMAGE_MODEL)
    }

    pub fn credit_cost(&self) -> i64 {
        CREDITS_PER_IMAGE * self.count as i64
    }

    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or_default().trim()
    }

    pub fn generation(&self, model: &ModelChoice, timeout: Duration) -> ImageGeneration {
        ImageGeneration {
            model: model.backend.to_string(),
            prompt: self.prompt().to_string(),
            n: self.count,
            aspect_ratio: self.aspect_ratio.clone(),
            image_url: match self.mode {
                ImageMode::ImageToImage => self.reference_image.clone(),
                ImageMode::TextToImage => None,
            },
            timeout,
        }
    }
}

/// Generate images synchronously, bounded by `timeout`.
pub async fn generate(
    client: &ProviderClient,
    request: &ImageRequest,
    timeout: Duration,
) -> Result<Vec<GeneratedImage>> {
    request.validate()?;
    let model = request.model();
    let urls = client.execute(&request.generation(&model, timeout)).await?;

    let created_at = Utc::now();
    Ok(urls
        .into_iter()
        .map(|url| GeneratedImage {
            id: Uuid::new_v4().to_string(),
            url,
            credit_cost: CREDITS_PER_IMAGE,
            model: model.id.clone(),
            prompt: request.prompt().to_string(),
            aspect_ratio: request.aspect_ratio.clone(),
            created_at,
        })
        .collect())
}
