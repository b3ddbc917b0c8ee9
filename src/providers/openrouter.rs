//! OpenRouter payload builders and response extractors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::client::ProviderCall;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    choices: Vec<CompletionChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl ProviderCall for ChatCompletion {
    type Output = ChatReply;

    fn path(&self) -> String {
        "/v1/chat/completions".to_string()
    }

    fn payload(&self) -> Option<Value> {
        serde_json::to_value(self).ok()
    }

    fn extract(&self, provider: &str, body: Value) -> Result<ChatReply> {
        let response: CompletionResponse = serde_json::from_value(body)
            .map_err(|e| Error::provider_unknown(provider, format!("bad completion: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider_unknown(provider, "no choices in response"))?;

        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(Error::provider_unknown(provider, "empty completion"));
        }

        Ok(ChatReply {
            content,
            model: response.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: choice.finish_reason,
            usage: response.usage,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageGeneration {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip)]
    pub timeout: Duration,
}

impl ProviderCall for ImageGeneration {
    type Output = Vec<String>;

    fn path(&self) -> String {
        "/v1/images/generations".to_string()
    }

    fn payload(&self) -> Option<Value> {
        serde_json::to_value(self).ok()
    }

    fn extract(&self, provider: &str, body: Value) -> Result<Vec<String>> {
        let urls: Vec<String> = body["data"]
            .as_array()
            .map(|items| items.iter().filter_map(image_url).collect())
            .unwrap_or_default();

        if urls.is_empty() {
            return Err(Error::provider_unknown(provider, "no images in response"));
        }
        Ok(urls)
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }
}

fn image_url(item: &Value) -> Option<String> {
    if let Some(url) = item["url"].as_str().filter(|u| !u.is_empty()) {
        return Some(url.to_string());
    }
    item["b64_json"]
        .as_str()
        .filter(|b| !b.is_empty())
        .map(|b64| format!("data:image/png;base64,{}", b64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion() -> ChatCompletion {
        ChatCompletion {
            model: "openai/gpt-4o-mini".to_string(),
            messages: vec![ChatTurn::user("hello")],
            temperature: None,
            max_tokens: Some(64),
        }
    }

    #[test]
    fn test_chat_payload_shape() {
        let payload = completion().payload().unwrap();
        assert_eq!(payload["model"], "openai/gpt-4o-mini");
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["max_tokens"], 64);
        assert!(payload.get("temperature").is_none());
    }

    #[test]
    fn test_chat_extract() {
        let reply = completion()
            .extract(
                "openrouter",
                json!({
                    "id": "gen-1",
                    "model": "openai/gpt-4o-mini",
                    "choices": [{ "message": { "role": "assistant", "content": "Hi!" }, "finish_reason": "stop" }],
                    "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
                }),
            )
            .unwrap();
        assert_eq!(reply.content, "Hi!");
        assert_eq!(reply.usage.unwrap().total_tokens, 5);

        let err = completion().extract("openrouter", json!({ "choices": [] }));
        assert!(err.is_err());
    }

    #[test]
    fn test_image_extract_handles_url_and_base64() {
        let call = ImageGeneration {
            model: "black-forest-labs/flux-schnell".to_string(),
            prompt: "a cat".to_string(),
            n: 2,
            aspect_ratio: "1:1".to_string(),
            image_url: None,
            timeout: Duration::from_secs(8),
        };
        let urls = call
            .extract(
                "openrouter",
                json!({ "data": [{ "url": "https://img/1.png" }, { "b64_json": "AAAA" }] }),
            )
            .unwrap();
        assert_eq!(urls, vec!["https://img/1.png", "data:image/png;base64,AAAA"]);
        assert!(call.payload().unwrap().get("timeout").is_none());
        assert!(call.extract("openrouter", json!({ "data": [] })).is_err());
    }
}
