//! Replicate predictions: create, get and cancel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::error::{Error, Result};
use crate::generation::{GenerationTask, TaskBackend, TaskHandle, TaskKind, TaskStatus};
use crate::providers::client::{ProviderCall, ProviderClient};

/// Backend model reference: `owner/name` (official model endpoint),
/// `owner/name:version` or a bare version hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    Official { owner: String, name: String },
    Version(String),
}

impl ModelRef {
    pub fn parse(model: &str) -> Self {
        if let Some((_, version)) = model.split_once(':') {
            return ModelRef::Version(version.to_string());
        }
        match model.split_once('/') {
            Some((owner, name)) => ModelRef::Official {
                owner: owner.to_string(),
                name: name.to_string(),
            },
            None => ModelRef::Version(model.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePrediction {
    pub kind: TaskKind,
    pub model: ModelRef,
    pub input: Value,
}

impl ProviderCall for CreatePrediction {
    type Output = GenerationTask;

    fn path(&self) -> String {
        match &self.model {
            ModelRef::Official { owner, name } => format!("/v1/models/{}/{}/predictions", owner, name),
            ModelRef::Version(_) => "/v1/predictions".to_string(),
        }
    }

    fn payload(&self) -> Option<Value> {
        Some(match &self.model {
            ModelRef::Official { .. } => json!({ "input": self.input }),
            ModelRef::Version(version) => json!({ "version": version, "input": self.input }),
        })
    }

    fn extract(&self, provider: &str, body: Value) -> Result<GenerationTask> {
        parse_prediction(provider, self.kind, &body)
    }
}

#[derive(Debug, Clone)]
pub struct GetPrediction(pub TaskHandle);

impl ProviderCall for GetPrediction {
    type Output = GenerationTask;

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> String {
        format!("/v1/predictions/{}", self.0.id)
    }

    fn payload(&self) -> Option<Value> {
        None
    }

    fn extract(&self, provider: &str, body: Value) -> Result<GenerationTask> {
        parse_prediction(provider, self.0.kind, &body)
    }
}

#[derive(Debug, Clone)]
pub struct CancelPrediction(pub TaskHandle);

impl ProviderCall for CancelPrediction {
    type Output = ();

    fn path(&self) -> String {
        format!("/v1/predictions/{}/cancel", self.0.id)
    }

    fn payload(&self) -> Option<Value> {
        None
    }

    fn extract(&self, _provider: &str, _body: Value) -> Result<()> {
        Ok(())
    }
}

/// Turn a prediction document into a task snapshot.
pub fn parse_prediction(provider: &str, kind: TaskKind, body: &Value) -> Result<GenerationTask> {
    let id = body["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::provider_unknown(provider, "prediction without id"))?;

    let raw_status = body["status"].as_str().unwrap_or_default();
    let status = TaskStatus::from_provider(raw_status).ok_or_else(|| {
        Error::provider_unknown(provider, format!("unknown prediction status '{}'", raw_status))
    })?;

    let created_at = timestamp(&body["created_at"]).unwrap_or_else(Utc::now);
    let updated_at = timestamp(&body["completed_at"])
        .or_else(|| timestamp(&body["started_at"]))
        .unwrap_or_else(Utc::now);

    Ok(GenerationTask {
        id: id.to_string(),
        kind,
        status,
        output: normalize_output(&body["output"]),
        error: normalize_error(&body["error"]),
        created_at,
        updated_at,
    })
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Replicate returns either a single URL or a list of them.
pub fn normalize_output(output: &Value) -> Vec<String> {
    match output {
        Value::String(url) if !url.is_empty() => vec![url.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Object(map) => map
            .values()
            .filter_map(|item| item.as_str())
            .filter(|url| url.starts_with("http"))
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn normalize_error(error: &Value) -> Option<String> {
    match error {
        Value::Null => None,
        Value::String(msg) if msg.is_empty() => None,
        Value::String(msg) => Some(msg.clone()),
        Value::Object(map) => map
            .get("detail")
            .or_else(|| map.get("message"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| Some(error.to_string())),
        other => Some(other.to_string()),
    }
}

/// Task backend that talks to Replicate directly.
#[derive(Clone)]
pub struct ReplicateBackend {
    client: Arc<ProviderClient>,
}

impl ReplicateBackend {
    pub fn new(client: Arc<ProviderClient>) -> Self {
        Self { client }
    }

    pub async fn create(&self, call: &CreatePrediction) -> Result<GenerationTask> {
        self.client.execute(call).await
    }
}

#[async_trait]
impl TaskBackend for ReplicateBackend {
    async fn poll(&self, handle: &TaskHandle) -> Result<GenerationTask> {
        self.client.execute(&GetPrediction(handle.clone())).await
    }

    async fn cancel(&self, handle: &TaskHandle) -> Result<()> {
        self.client.execute(&CancelPrediction(handle.clone())).await.map_err(|e| {
            warn!("Replicate cancel for {} failed: {}", handle.id, e);
            e
        })
    }
}
