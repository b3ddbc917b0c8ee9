//! Prompt enhancement: rewrites a short idea into a detailed generation prompt.

use serde::{Deserialize, Serialize};

use crate::adapters::{choose_model, require_text, ModelChoice};
use crate::error::{Error, Result};
use crate::providers::{ChatCompletion, ChatTurn, ProviderClient};

pub const ENHANCE_MODELS: &[(&str, &str)] = &[("prompt-enhancer", "openai/gpt-4o-mini")];
pub const ENHANCE_CREDITS: i64 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhanceTarget {
    #[default]
    Image,
    Video,
    Audio,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhanceRequest {
    pub prompt: Option<String>,
    #[serde(default)]
    pub target: EnhanceTarget,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnhancedPrompt {
    pub original: String,
    pub enhanced: String,
}

fn system_prompt(target: EnhanceTarget) -> &'static str {
    match target {
        EnhanceTarget::Image => {
            "Rewrite the user's idea as a single detailed prompt for an image model. \
             Describe subject, composition, lighting, style and mood. Reply with the prompt only."
        }
        EnhanceTarget::Video => {
            "Rewrite the user's idea as a single detailed prompt for a text-to-video model. \
             Describe the scene, camera movement and pacing. Reply with the prompt only."
        }
        EnhanceTarget::Audio => {
            "Rewrite the user's idea as a single prompt for a music model. \
             Name genre, instruments, tempo and mood. Reply with the prompt only."
        }
    }
}

impl EnhanceRequest {
    pub fn validate(&self) -> Result<()> {
        require_text("prompt", self.prompt.as_deref())
    }

    pub fn model(&self) -> ModelChoice {
        choose_model(ENHANCE_MODELS, None, "prompt-enhancer")
    }

    pub fn completion(&self, model: &ModelChoice) -> ChatCompletion {
        ChatCompletion {
            model: model.backend.to_string(),
            messages: vec![
                ChatTurn::system(system_prompt(self.target)),
                ChatTurn::user(self.prompt.as_deref().unwrap_or_default().trim()),
            ],
            temperature: Some(0.7),
            max_tokens: Some(400),
        }
    }
}

pub async fn enhance(client: &ProviderClient, request: &EnhanceRequest) -> Result<EnhancedPrompt> {
    request.validate()?;
    let model = request.model();
    let reply = client.execute(&request.completion(&model)).await?;

    let enhanced = reply.content.trim().trim_matches('"').trim().to_string();
    if enhanced.is_empty() {
        return Err(Error::provider_unknown(client.name(), "empty enhanced prompt"));
    }

    Ok(EnhancedPrompt {
        original: request.prompt.clone().unwrap_or_default(),
        enhanced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::{CircuitBreakerConfig, ProviderSettings};
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> ProviderClient {
        let settings = ProviderSettings {
            api_key: Some("key".to_string()),
            base_url: uri.to_string(),
            timeout_seconds: 5,
            image_timeout_seconds: 5,
        };
        ProviderClient::new("openrouter", &settings, &CircuitBreakerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_empty_prompt_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let request = EnhanceRequest { prompt: Some(" ".to_string()), target: EnhanceTarget::Image };
        assert!(matches!(enhance(&client(&server.uri()), &request).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_strips_quotes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "\"A tabby cat on a windowsill, golden hour\"" } }]
            })))
            .mount(&server)
            .await;

        let request = EnhanceRequest { prompt: Some("cat".to_string()), target: EnhanceTarget::Image };
        let result = enhance(&client(&server.uri()), &request).await.unwrap();
        assert_eq!(result.enhanced, "A tabby cat on a windowsill, golden hour");
        assert_eq!(result.original, "cat");
    }

    #[test]
    fn test_payload_uses_target_prompt() {
        let request = EnhanceRequest { prompt: Some("lofi beat".to_string()), target: EnhanceTarget::Audio };
        let completion = request.completion(&request.model());
        assert_eq!(completion.model, "openai/gpt-4o-mini");
        assert!(completion.messages[0].content.contains("music"));
        assert_eq!(completion.messages[1].content, "lofi beat");
    }
}
