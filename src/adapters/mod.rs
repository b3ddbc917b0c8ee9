//! Per-feature provider adapters.
//!
//! Every adapter validates its request before any I/O, maps the frontend model
//! id to a backend model through a static table and builds the provider
//! payload. The HTTP round trip itself is `ProviderClient::execute`.

pub mod audio;
pub mod avatar;
pub mod chat;
pub mod enhance;
pub mod image;
pub mod video;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::generation::{Feature, GenerationTask, TaskKind};
use crate::providers::{CreatePrediction, ReplicateBackend};

pub use audio::{AudioMode, AudioRequest};
pub use avatar::AvatarRequest;
pub use chat::ChatRequest;
pub use enhance::EnhanceRequest;
pub use image::{ImageMode, ImageRequest};
pub use video::{VideoMode, VideoRequest};

/// Frontend model id and the backend model it runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelChoice {
    /// Id the caller asked for. Tier gating looks at this one.
    pub id: String,
    pub backend: &'static str,
}

/// Look `requested` up in `table`, falling back to `default_id` when the
/// caller named nothing and to the default's backend when the id is unknown.
pub(crate) fn choose_model(
    table: &[(&'static str, &'static str)],
    requested: Option<&str>,
    default_id: &'static str,
) -> ModelChoice {
    let fallback = table
        .iter()
        .find(|(id, _)| *id == default_id)
        .map(|(_, backend)| *backend)
        .unwrap_or_default();

    match requested.map(str::trim).filter(|id| !id.is_empty()) {
        None => ModelChoice { id: default_id.to_string(), backend: fallback },
        Some(id) => match table.iter().find(|(known, _)| *known == id) {
            Some((_, backend)) => ModelChoice { id: id.to_string(), backend: *backend },
            None => {
                warn!("Unknown model '{}', falling back to {}", id, fallback);
                ModelChoice { id: id.to_string(), backend: fallback }
            }
        },
    }
}

pub(crate) fn require_text(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(Error::validation(format!("{} is required", field))),
    }
}

pub(crate) fn require_url(field: &str, value: Option<&str>) -> Result<()> {
    require_text(field, value)?;
    let value = value.unwrap_or_default().trim();
    if value.starts_with("data:") || url::Url::parse(value).is_ok() {
        Ok(())
    } else {
        Err(Error::validation(format!("{} must be a URL", field)))
    }
}

/// Rough provider spend per credit, for the expense ledger.
pub fn estimated_cost_usd(feature: Feature, credits: i64) -> Decimal {
    let per_credit = match feature {
        Feature::Chat => Decimal::new(5, 4),
        Feature::Enhance => Decimal::new(2, 4),
        Feature::Image => Decimal::new(3, 3),
        Feature::Video => Decimal::new(25, 3),
        Feature::Audio => Decimal::new(7, 3),
        Feature::Avatar => Decimal::new(8, 3),
    };
    // Zero-credit actions still cost the provider one unit.
    per_credit * Decimal::from(credits.max(1))
}

/// A generation that runs as a Replicate prediction.
pub trait TaskRequest: Send + Sync {
    const KIND: TaskKind;

    fn validate(&self) -> Result<()>;

    fn model(&self) -> ModelChoice;

    fn credit_cost(&self) -> i64;

    /// Text stored in the generation history.
    fn summary(&self) -> String;

    fn prediction(&self, model: &ModelChoice) -> CreatePrediction;
}

/// Validate, then create the prediction. Invalid requests never reach the network.
pub async fn submit<R: TaskRequest>(backend: &ReplicateBackend, request: &R) -> Result<GenerationTask> {
    request.validate()?;
    let model = request.model();
    backend.create(&request.prediction(&model)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[(&str, &str)] = &[("fast", "acme/fast-v1"), ("slow", "acme/slow-v2")];

    #[test]
    fn test_choose_model() {
        assert_eq!(choose_model(TABLE, Some("slow"), "fast").backend, "acme/slow-v2");
        assert_eq!(choose_model(TABLE, None, "fast").id, "fast");
        assert_eq!(choose_model(TABLE, Some("  "), "fast").id, "fast");

        let unknown = choose_model(TABLE, Some("mystery"), "fast");
        assert_eq!(unknown.id, "mystery");
        assert_eq!(unknown.backend, "acme/fast-v1");
    }

    #[test]
    fn test_require_url() {
        assert!(require_url("image_url", Some("https://cdn/a.png")).is_ok());
        assert!(require_url("image_url", Some("data:image/png;base64,AAAA")).is_ok());
        assert!(require_url("image_url", Some("not a url")).is_err());
        assert!(require_url("image_url", None).is_err());
    }

    #[test]
    fn test_estimated_cost() {
        assert_eq!(estimated_cost_usd(Feature::Image, 2), Decimal::new(6, 3));
        assert_eq!(estimated_cost_usd(Feature::Enhance, 0), Decimal::new(2, 4));
    }
}
