use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapters::{choose_model, require_text, ModelChoice, TaskRequest};
use crate::error::{Error, Result};
use crate::generation::TaskKind;
use crate::providers::{CreatePrediction, ModelRef};

pub const MUSIC_MODELS: &[(&str, &str)] = &[
    ("musicgen", "meta/musicgen:671ac645ce5e552cc63a54a2bbff63fcf798043055d2dac5fc9e36a837eedcfb"),
    ("stable-audio", "stackadoptive/stable-audio-open-1.0:9aff84a639f96d0f7e6081cdea002d15133d0043727f849c40abdd166b7c75a8"),
];

pub const SPEECH_MODELS: &[(&str, &str)] = &[(
    "kokoro-tts",
    "jaaari/kokoro-82m:f559560eb822dc509045f3921a1921234918b91739db4bf3daab2169b71c7a13",
)];

pub const AUDIO_CREDITS: i64 = 3;
const MAX_MUSIC_SECONDS: u32 = 30;
const MAX_SPEECH_CHARS: usize = 5000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    #[default]
    Music,
    Speech,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioRequest {
    #[serde(default)]
    pub mode: AudioMode,
    /// Music description.
    pub prompt: Option<String>,
    /// Text to speak.
    pub text: Option<String>,
    pub voice: Option<String>,
    pub model: Option<String>,
    #[serde(default = "default_duration")]
    pub duration: u32,
}

fn default_duration() -> u32 {
    10
}

impl TaskRequest for AudioRequest {
    const KIND: TaskKind = TaskKind::Audio;

    fn validate(&self) -> Result<()> {
        match self.mode {
            AudioMode::Music => {
                require_text("prompt", self.prompt.as_deref())?;
                if self.voice.is_some() {
                    return Err(Error::validation("voice is only supported for speech"));
                }
                if self.duration == 0 || self.duration > MAX_MUSIC_SECONDS {
                    return Err(Error::validation(format!(
                        "duration must be between 1 and {} seconds",
                        MAX_MUSIC_SECONDS
                    )));
                }
            }
            AudioMode::Speech => {
                require_text("text", self.text.as_deref())?;
                if self.text.as_deref().unwrap_or_default().chars().count() > MAX_SPEECH_CHARS {
                    return Err(Error::validation(format!(
                        "text must be at most {} characters",
                        MAX_SPEECH_CHARS
                    )));
                }
            }
        }
        Ok(())
    }

    fn model(&self) -> ModelChoice {
        match self.mode {
            AudioMode::Music => choose_model(MUSIC_MODELS, self.model.as_deref(), "musicgen"),
            AudioMode::Speech => choose_model(SPEECH_MODELS, self.model.as_deref(), "kokoro-tts"),
        }
    }

    fn credit_cost(&self) -> i64 {
        AUDIO_CREDITS
    }

    fn summary(&self) -> String {
        match self.mode {
            AudioMode::Music => self.prompt.as_deref(),
            AudioMode::Speech => self.text.as_deref(),
        }
        .unwrap_or_default()
        .trim()
        .to_string()
    }

    fn prediction(&self, model: &ModelChoice) -> CreatePrediction {
        let input = match self.mode {
            AudioMode::Music => json!({
                "prompt": self.summary(),
                "duration": self.duration,
                "output_format": "mp3",
            }),
            AudioMode::Speech => json!({
                "text": self.summary(),
                "voice": self.voice.as_deref().unwrap_or("af_bella"),
            }),
        };

        CreatePrediction {
            kind: TaskKind::Audio,
            model: ModelRef::parse(model.backend),
            input,
        }
    }
}
