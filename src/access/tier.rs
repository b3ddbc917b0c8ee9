//! Subscription tiers and the model gating table.

use serde::{Deserialize, Serialize};

/// Subscription levels, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Start,
    Creator,
    ProStudio,
    Maximal,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Start, Tier::Creator, Tier::ProStudio, Tier::Maximal];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Creator => "creator",
            Self::ProStudio => "pro_studio",
            Self::Maximal => "maximal",
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Start
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = TierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "start" | "free" => Ok(Self::Start),
            "creator" => Ok(Self::Creator),
            "pro_studio" | "prostudio" | "pro" => Ok(Self::ProStudio),
            "maximal" | "max" => Ok(Self::Maximal),
            _ => Err(TierParseError(s.to_string())),
        }
    }
}

/// Error parsing a tier string
#[derive(Debug, Clone)]
pub struct TierParseError(pub String);

impl std::fmt::Display for TierParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid tier: {}", self.0)
    }
}

impl std::error::Error for TierParseError {}

/// Frontend model id -> minimum tier. Ids missing here are treated as `Maximal`.
pub const MODEL_TIERS: &[(&str, Tier)] = &[
    // chat
    ("gpt-4o-mini", Tier::Start),
    ("deepseek-chat", Tier::Start),
    ("gpt-4o", Tier::Creator),
    ("claude-3.5-sonnet", Tier::Creator),
    ("gemini-2.5-pro", Tier::ProStudio),
    ("claude-opus-4", Tier::Maximal),
    // prompt enhancement
    ("prompt-enhancer", Tier::Start),
    // image
    ("flux-schnell", Tier::Start),
    ("flux-dev", Tier::Creator),
    ("flux-pro", Tier::ProStudio),
    ("ideogram-v3", Tier::ProStudio),
    ("gpt-image-1", Tier::Maximal),
    // video
    ("wan-2.1", Tier::Creator),
    ("hailuo-02", Tier::ProStudio),
    ("kling-v2", Tier::ProStudio),
    ("veo-3", Tier::Maximal),
    // audio
    ("musicgen", Tier::Start),
    ("kokoro-tts", Tier::Start),
    ("stable-audio", Tier::Creator),
    // avatar
    ("sadtalker", Tier::Creator),
    ("omni-human", Tier::Maximal),
];

/// Minimum tier for a model. Unknown ids fail closed to the highest tier.
pub fn required_tier(model_id: &str) -> Tier {
    MODEL_TIERS
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, tier)| *tier)
        .unwrap_or(Tier::Maximal)
}

pub fn has_access(user_tier: Tier, required: Tier) -> bool {
    user_tier >= required
}
