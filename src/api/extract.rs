//! Request extractors: caller identity and JSON bodies with crate errors.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;

use crate::api::error::ApiError;
use crate::error::Error;
use crate::generation::Caller;

pub const USER_ID_HEADER: &str = "x-user-id";

fn user_id(parts: &Parts) -> Result<Option<String>, ApiError> {
    let Some(value) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| Error::unauthorized("X-User-Id header is not valid text"))?;
    Ok(Some(value.trim().to_string()).filter(|v| !v.is_empty()))
}

/// Optional caller identity. Never rejects a request without the header.
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller { user_id: user_id(parts)? })
    }
}

/// Caller identity that must be present (401 otherwise).
#[derive(Debug, Clone)]
pub struct RequireUser(pub String);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id(parts)?
            .map(RequireUser)
            .ok_or_else(|| Error::unauthorized("X-User-Id header is required").into())
    }
}

/// `Json` whose rejections come back as `VALIDATION_ERROR` bodies.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(Error::validation(rejection.body_text()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    async fn caller_from(header: Option<&str>) -> Result<Caller, ApiError> {
        let mut builder = HttpRequest::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("X-User-Id", value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_optional_caller() {
        assert_eq!(caller_from(None).await.unwrap(), Caller::anonymous());
        assert_eq!(caller_from(Some("  ")).await.unwrap(), Caller::anonymous());
        assert_eq!(caller_from(Some(" u-1 ")).await.unwrap(), Caller::user("u-1"));
    }

    #[tokio::test]
    async fn test_required_user() {
        let (mut parts, _) = HttpRequest::builder().uri("/").body(()).unwrap().into_parts();
        let err = RequireUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");
    }
}
