use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::adapters::enhance::EnhancedPrompt;
use crate::adapters::{ChatRequest, EnhanceRequest, ImageRequest, TaskRequest};
use crate::api::error::ApiResult;
use crate::api::extract::ApiJson;
use crate::app::AppState;
use crate::generation::service::ChatResult;
use crate::generation::{Caller, GenerationTask, ImageResult, SubmittedTask};
use crate::storage::GenerationRecord;

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<Json<ChatResult>> {
    Ok(Json(state.generation().chat(&caller, &request).await?))
}

/// POST /api/enhance
pub async fn enhance(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(request): ApiJson<EnhanceRequest>,
) -> ApiResult<Json<EnhancedPrompt>> {
    Ok(Json(state.generation().enhance(&caller, &request).await?))
}

/// POST /api/image
pub async fn image(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(request): ApiJson<ImageRequest>,
) -> ApiResult<(StatusCode, Json<ImageResult>)> {
    let result = state.generation().image(&caller, &request).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /api/{video,audio,avatar}
pub async fn submit<R>(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(request): ApiJson<R>,
) -> ApiResult<(StatusCode, Json<SubmittedTask>)>
where
    R: TaskRequest + DeserializeOwned + 'static,
{
    let submitted = state.generation().submit(&caller, &request).await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

/// GET /api/{video,audio,avatar}/{task_id}
pub async fn status<R: TaskRequest>(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<String>,
) -> ApiResult<Json<GenerationTask>> {
    Ok(Json(state.generation().status(&caller, R::KIND, &task_id).await?))
}

/// POST /api/{video,audio,avatar}/{task_id}/cancel
pub async fn cancel<R: TaskRequest>(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<String>,
) -> ApiResult<Json<GenerationTask>> {
    Ok(Json(state.generation().cancel(&caller, R::KIND, &task_id).await?))
}

/// GET /api/generations
pub async fn history(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<GenerationRecord>>> {
    Ok(Json(state.generation().history(&caller, page.limit, page.offset).await?))
}
