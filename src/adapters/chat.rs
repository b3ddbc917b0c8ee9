use serde::Deserialize;
use tracing::debug;

use crate::adapters::{choose_model, ModelChoice};
use crate::error::{Error, Result};
use crate::providers::{ChatCompletion, ChatReply, ChatTurn, ProviderClient};

pub const CHAT_MODELS: &[(&str, &str)] = &[
    ("gpt-4o-mini", "openai/gpt-4o-mini"),
    ("deepseek-chat", "deepseek/deepseek-chat"),
    ("gpt-4o", "openai/gpt-4o"),
    ("claude-3.5-sonnet", "anthropic/claude-3.5-sonnet"),
    ("gemini-2.5-pro", "google/gemini-2.5-pro"),
    ("claude-opus-4", "anthropic/claude-opus-4"),
];

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const CHAT_CREDITS: i64 = 1;

const ROLES: &[&str] = &["system", "user", "assistant"];

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    pub model: Option<String>,
    /// Persist both turns into this conversation.
    pub conversation_id: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<()> {
        let last = self
            .messages
            .last()
            .ok_or_else(|| Error::validation("messages must not be empty"))?;

        if let Some(turn) = self.messages.iter().find(|t| !ROLES.contains(&t.role.as_str())) {
            return Err(Error::validation(format!("unsupported message role '{}'", turn.role)));
        }
        if last.content.trim().is_empty() {
            return Err(Error::validation("the last message must not be empty"));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::validation("temperature must be between 0 and 2"));
            }
        }
        Ok(())
    }

    pub fn model(&self) -> ModelChoice {
        choose_model(CHAT_MODELS, self.model.as_deref(), DEFAULT_CHAT_MODEL)
    }

    pub fn credit_cost(&self) -> i64 {
        CHAT_CREDITS
    }

    pub fn completion(&self, model: &ModelChoice) -> ChatCompletion {
        ChatCompletion {
            model: model.backend.to_string(),
            messages: self.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Last user message, used as the history summary.
    pub fn summary(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|t| t.role == "user")
            .map(|t| t.content.clone())
            .unwrap_or_default()
    }
}

pub async fn complete(client: &ProviderClient, request: &ChatRequest) -> Result<ChatReply> {
    request.validate()?;
    let model = request.model();
    debug!("Chat with {} ({} turns)", model.backend, request.messages.len());
    client.execute(&request.completion(&model)).await
}
