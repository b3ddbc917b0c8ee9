//! Error responses for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

const TRY_AGAIN: &str = "The generation service is temporarily unavailable, try again later";

/// Crate error rendered as `{ error, code }`.
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) | Error::ProviderRejected { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            Error::TierRequired { .. } => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::ProviderUnavailable { .. }
            | Error::NotConfigured(_)
            | Error::CircuitBreakerOpen(_)
            | Error::StorageUnavailable
            | Error::ColdStartAborted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::EmptyOutput(_) | Error::GenerationFailed(_) | Error::ProviderUnknown { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match &self.0 {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::ProviderRejected { .. } => "PROVIDER_REJECTED",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            Error::TierRequired { .. } => "TIER_REQUIRED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Error::NotConfigured(_) => "PROVIDER_NOT_CONFIGURED",
            Error::CircuitBreakerOpen(_) => "CIRCUIT_OPEN",
            Error::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Error::ColdStartAborted(_) => "COLD_START_ABORTED",
            Error::EmptyOutput(_) => "EMPTY_OUTPUT",
            Error::GenerationFailed(_) => "GENERATION_FAILED",
            Error::ProviderUnknown { .. } => "PROVIDER_ERROR",
            Error::Timeout { .. } => "TIMEOUT",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the caller. Provider detail stays in the logs.
    fn public_message(&self) -> String {
        match &self.0 {
            Error::Validation(msg) | Error::Unauthorized(msg) => msg.clone(),
            Error::InsufficientCredits { .. }
            | Error::TierRequired { .. }
            | Error::NotFound(_)
            | Error::Conflict(_)
            | Error::StorageUnavailable => self.0.to_string(),
            Error::RateLimited { .. } => "Too many requests to the provider, try again later".to_string(),
            Error::ProviderRejected { .. } => "The provider rejected the request".to_string(),
            Error::ProviderUnavailable { .. }
            | Error::NotConfigured(_)
            | Error::CircuitBreakerOpen(_)
            | Error::ColdStartAborted(_) => TRY_AGAIN.to_string(),
            Error::EmptyOutput(_) | Error::GenerationFailed(_) | Error::ProviderUnknown { .. } => {
                "Generation failed, try again later".to_string()
            }
            Error::Timeout { .. } => "Generation took too long, try again later".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match &self.0 {
            Error::InsufficientCredits { required, available } => {
                Some(json!({ "required": required, "available": available }))
            }
            Error::TierRequired { model, required } => {
                Some(json!({ "model": model, "required_tier": required }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() || self.0.category().is_some() {
            tracing::error!(error = %self.0, code = self.error_code(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        let body = ErrorBody {
            error: self.public_message(),
            code: self.error_code(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}
