use thiserror::Error;

use crate::access::Tier;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider {provider} unavailable: {detail}")]
    ProviderUnavailable { provider: String, detail: String },

    #[error("Provider {provider} rate limited: {detail}")]
    RateLimited { provider: String, detail: String },

    #[error("Provider {provider} rejected request: {detail}")]
    ProviderRejected { provider: String, detail: String },

    #[error("Provider {provider} returned unexpected response: {detail}")]
    ProviderUnknown { provider: String, detail: String },

    #[error("Provider {0} is not configured")]
    NotConfigured(String),

    #[error("Circuit breaker is open for {0}")]
    CircuitBreakerOpen(String),

    #[error("Task {task_id} did not finish after {polls} polls")]
    Timeout { task_id: String, polls: u32 },

    #[error("Task {0} never left the starting state and was canceled")]
    ColdStartAborted(String),

    #[error("Task {0} completed without output")]
    EmptyOutput(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Task {0} was canceled")]
    Canceled(String),

    #[error("Storage is not configured")]
    StorageUnavailable,

    #[error("Insufficient credits: need {required}, have {available}")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("Model {model} requires the {required} tier")]
    TierRequired { model: String, required: Tier },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// User-facing grouping of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RateLimited,
    Unavailable,
    BadRequest,
    Unknown,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Error::Unauthorized(msg.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Error::Unknown(msg.into())
    }

    pub fn provider_unavailable(provider: &str, detail: impl Into<String>) -> Self {
        Error::ProviderUnavailable {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }

    pub fn provider_unknown(provider: &str, detail: impl Into<String>) -> Self {
        Error::ProviderUnknown {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }

    /// Category of a provider-side failure, `None` for everything else.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Error::RateLimited { .. } => Some(ErrorCategory::RateLimited),
            Error::ProviderUnavailable { .. }
            | Error::NotConfigured(_)
            | Error::CircuitBreakerOpen(_) => Some(ErrorCategory::Unavailable),
            Error::ProviderRejected { .. } => Some(ErrorCategory::BadRequest),
            Error::ProviderUnknown { .. } | Error::Http(_) => Some(ErrorCategory::Unknown),
            _ => None,
        }
    }

    /// Whether the failure should count against the provider's circuit breaker.
    pub fn is_provider_fault(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable { .. } | Error::ProviderUnknown { .. } | Error::Http(_)
        )
    }

    /// Whether a failed status read is worth repeating on the next poll.
    pub fn is_transient(&self) -> bool {
        self.is_provider_fault() || matches!(self, Error::RateLimited { .. } | Error::CircuitBreakerOpen(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = Error::RateLimited {
            provider: "replicate".into(),
            detail: "slow down".into(),
        };
        assert_eq!(err.category(), Some(ErrorCategory::RateLimited));
        assert_eq!(
            Error::NotConfigured("openrouter".into()).category(),
            Some(ErrorCategory::Unavailable)
        );
        assert_eq!(Error::validation("prompt is required").category(), None);
    }

    #[test]
    fn test_provider_fault() {
        assert!(Error::provider_unavailable("openrouter", "502").is_provider_fault());
        assert!(!Error::ProviderRejected {
            provider: "openrouter".into(),
            detail: "bad model".into(),
        }
        .is_provider_fault());
    }

    #[test]
    fn test_transient_poll_failures() {
        assert!(Error::provider_unavailable("replicate", "502 bad gateway").is_transient());
        assert!(Error::CircuitBreakerOpen("replicate".into()).is_transient());
        assert!(Error::RateLimited {
            provider: "replicate".into(),
            detail: "slow down".into(),
        }
        .is_transient());
        assert!(!Error::not_found("video task abc").is_transient());
        assert!(!Error::unauthorized("bad token").is_transient());
        assert!(!Error::validation("bad id").is_transient());
    }
}
