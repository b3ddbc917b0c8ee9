use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapters::{choose_model, require_text, require_url, ModelChoice, TaskRequest};
use crate::error::{Error, Result};
use crate::generation::TaskKind;
use crate::providers::{CreatePrediction, ModelRef};

pub const VIDEO_MODELS: &[(&str, &str)] = &[
    ("wan-2.1", "wavespeedai/wan-2.1-t2v-480p"),
    ("hailuo-02", "minimax/hailuo-02"),
    ("kling-v2", "kwaivgi/kling-v2.1"),
    ("veo-3", "google/veo-3"),
];

/// Image-to-video variants where the backend differs from text-to-video.
const IMAGE_TO_VIDEO_MODELS: &[(&str, &str)] = &[("wan-2.1", "wavespeedai/wan-2.1-i2v-480p")];

pub const DEFAULT_VIDEO_MODEL: &str = "kling-v2";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoMode {
    #[default]
    TextToVideo,
    ImageToVideo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoRequest {
    pub prompt: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub mode: VideoMode,
    #[serde(alias = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default = "default_aspect_ratio", alias = "aspectRatio")]
    pub aspect_ratio: String,
    #[serde(alias = "negativePrompt")]
    pub negative_prompt: Option<String>,
}

fn default_duration() -> u32 {
    5
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

impl TaskRequest for VideoRequest {
    const KIND: TaskKind = TaskKind::Video;

    fn validate(&self) -> Result<()> {
        require_text("prompt", self.prompt.as_deref())?;
        if self.mode == VideoMode::ImageToVideo {
            require_url("image_url", self.image_url.as_deref())?;
        }
        if !matches!(self.duration, 5 | 10) {
            return Err(Error::validation("duration must be 5 or 10 seconds"));
        }
        if !matches!(self.aspect_ratio.as_str(), "16:9" | "9:16" | "1:1") {
            return Err(Error::validation(format!(
                "unsupported aspect ratio '{}'",
                self.aspect_ratio
            )));
        }
        Ok(())
    }

    fn model(&self) -> ModelChoice {
        let choice = choose_model(VIDEO_MODELS, self.model.as_deref(), DEFAULT_VIDEO_MODEL);
        if self.mode == VideoMode::ImageToVideo {
            if let Some((_, backend)) = IMAGE_TO_VIDEO_MODELS.iter().find(|(id, _)| *id == choice.id) {
                return ModelChoice { id: choice.id, backend: *backend };
            }
        }
        choice
    }

    fn credit_cost(&self) -> i64 {
        if self.duration >= 10 {
            20
        } else {
            10
        }
    }

    fn summary(&self) -> String {
        self.prompt.as_deref().unwrap_or_default().trim().to_string()
    }

    fn prediction(&self, model: &ModelChoice) -> CreatePrediction {
        let mut input = json!({
            "prompt": self.summary(),
            "duration": self.duration,
            "aspect_ratio": self.aspect_ratio,
        });
        if let Some(negative) = self.negative_prompt.as_deref().filter(|n| !n.trim().is_empty()) {
            input["negative_prompt"] = json!(negative);
        }
        if self.mode == VideoMode::ImageToVideo {
            // Kling names its first frame `start_image`; the others use `image`.
            let key = if model.backend.starts_with("kwaivgi/") { "start_image" } else { "image" };
            input[key] = json!(self.image_url);
        }

        CreatePrediction {
            kind: TaskKind::Video,
            model: ModelRef::parse(model.backend),
            input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::submit;
    use crate::app::config::{CircuitBreakerConfig, ProviderSettings};
    use crate::generation::TaskStatus;
    use crate::providers::{ProviderClient, ReplicateBackend};
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(value: serde_json::Value) -> VideoRequest {
        serde_json::from_value(value).unwrap()
    }

    fn backend(uri: &str) -> ReplicateBackend {
        let settings = ProviderSettings {
            api_key: Some("r8_test".to_string()),
            base_url: uri.to_string(),
            timeout_seconds: 5,
            image_timeout_seconds: 5,
        };
        ReplicateBackend::new(Arc::new(
            ProviderClient::new("replicate", &settings, &CircuitBreakerConfig::default()).unwrap(),
        ))
    }

    #[test]
    fn test_credit_cost_by_duration() {
        assert_eq!(request(json!({ "prompt": "x" })).credit_cost(), 10);
        assert_eq!(request(json!({ "prompt": "x", "duration": 10 })).credit_cost(), 20);
    }

    #[test]
    fn test_validation() {
        assert!(request(json!({ "prompt": "x", "duration": 7 })).validate().is_err());
        assert!(request(json!({ "prompt": "x", "mode": "image_to_video" })).validate().is_err());
        assert!(request(json!({ "prompt": "x", "aspect_ratio": "4:3" })).validate().is_err());
        assert!(request(json!({ "prompt": "x" })).validate().is_ok());
    }

    #[test]
    fn test_image_to_video_payload() {
        let req = request(json!({
            "prompt": "the statue blinks",
            "mode": "image_to_video",
            "imageUrl": "https://cdn/statue.png"
        }));
        let model = req.model();
        let prediction = req.prediction(&model);
        assert_eq!(prediction.input["start_image"], "https://cdn/statue.png");

        let wan = request(json!({
            "prompt": "x",
            "model": "wan-2.1",
            "mode": "image_to_video",
            "image_url": "https://cdn/a.png"
        }));
        let model = wan.model();
        assert_eq!(model.backend, "wavespeedai/wan-2.1-i2v-480p");
        assert_eq!(wan.prediction(&model).input["image"], "https://cdn/a.png");
    }

    #[tokio::test]
    async fn test_empty_prompt_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(201)).expect(0).mount(&server).await;

        let err = submit(&backend(&server.uri()), &request(json!({ "prompt": "" }))).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_submit_creates_prediction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/models/kwaivgi/kling-v2.1/predictions"))
            .and(body_partial_json(json!({ "input": { "prompt": "waves", "duration": 5 } })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "pred-9", "status": "starting" })))
            .expect(1)
            .mount(&server)
            .await;

        let task = submit(&backend(&server.uri()), &request(json!({ "prompt": "waves" }))).await.unwrap();
        assert_eq!(task.id, "pred-9");
        assert_eq!(task.status, TaskStatus::Starting);
        assert_eq!(task.kind, TaskKind::Video);
    }
}
