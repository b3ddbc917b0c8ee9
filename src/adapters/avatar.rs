use serde::Deserialize;
use serde_json::json;

use crate::adapters::{choose_model, require_url, ModelChoice, TaskRequest};
use crate::error::{Error, Result};
use crate::generation::TaskKind;
use crate::providers::{CreatePrediction, ModelRef};

pub const AVATAR_MODELS: &[(&str, &str)] = &[
    ("sadtalker", "cjwbw/sadtalker:a519cc0cfebaaeade068b23899165a11ec76aaa1d2b313d40d214f204ec957a3"),
    ("omni-human", "bytedance/omni-human"),
];

pub const DEFAULT_AVATAR_MODEL: &str = "sadtalker";
pub const AVATAR_CREDITS: i64 = 15;

/// Talking-head video from a portrait and either an audio track or a script.
#[derive(Debug, Clone, Deserialize)]
pub struct AvatarRequest {
    #[serde(alias = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(alias = "audioUrl")]
    pub audio_url: Option<String>,
    pub text: Option<String>,
    pub voice: Option<String>,
    pub model: Option<String>,
}

impl AvatarRequest {
    fn has_audio(&self) -> bool {
        self.audio_url.as_deref().is_some_and(|a| !a.trim().is_empty())
    }

    fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

impl TaskRequest for AvatarRequest {
    const KIND: TaskKind = TaskKind::Avatar;

    fn validate(&self) -> Result<()> {
        require_url("image_url", self.image_url.as_deref())?;
        if self.has_audio() {
            require_url("audio_url", self.audio_url.as_deref())?;
        } else if !self.has_text() {
            return Err(Error::validation("audio_url or text is required"));
        }
        Ok(())
    }

    fn model(&self) -> ModelChoice {
        choose_model(AVATAR_MODELS, self.model.as_deref(), DEFAULT_AVATAR_MODEL)
    }

    fn credit_cost(&self) -> i64 {
        AVATAR_CREDITS
    }

    fn summary(&self) -> String {
        match self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(text) => text.trim().to_string(),
            None => "avatar from audio".to_string(),
        }
    }

    fn prediction(&self, model: &ModelChoice) -> CreatePrediction {
        let mut input = match ModelRef::parse(model.backend) {
            ModelRef::Version(_) => json!({
                "source_image": self.image_url,
                "still": true,
                "preprocess": "full",
            }),
            ModelRef::Official { .. } => json!({ "image": self.image_url }),
        };

        let audio_key = if input.get("source_image").is_some() { "driven_audio" } else { "audio" };
        if self.has_audio() {
            input[audio_key] = json!(self.audio_url);
        } else {
            input["text"] = json!(self.summary());
            input["voice"] = json!(self.voice.as_deref().unwrap_or("af_bella"));
        }

        CreatePrediction {
            kind: TaskKind::Avatar,
            model: ModelRef::parse(model.backend),
            input,
        }
    }
}
