use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::adapters::chat::DEFAULT_CHAT_MODEL;
use crate::api::error::ApiResult;
use crate::api::extract::ApiJson;
use crate::api::generation::Page;
use crate::app::AppState;
use crate::error::{Error, Result};
use crate::generation::Caller;
use crate::storage::{Conversation, Storage, StoredMessage};

const MESSAGE_ROLES: &[&str] = &["system", "user", "assistant"];

#[derive(Debug, Default, Deserialize)]
pub struct NewConversation {
    #[serde(default)]
    pub title: String,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    pub role: String,
    pub content: String,
}

/// Conversation visible to `caller`; other owners' conversations read as missing.
async fn owned(storage: &Storage, caller: &Caller, id: &str) -> Result<Conversation> {
    storage
        .conversations
        .get(id)
        .await?
        .filter(|c| c.is_owned_by(caller.user_id.as_deref()))
        .ok_or_else(|| Error::not_found(format!("conversation {}", id)))
}

/// GET /api/conversations
pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = state
        .storage()?
        .conversations
        .list(caller.user_id.as_deref(), page.limit, page.offset)
        .await?;
    Ok(Json(conversations))
}

/// POST /api/conversations
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(body): ApiJson<NewConversation>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let model = body.model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL);
    let conversation = state
        .storage()?
        .conversations
        .create(caller.user_id.as_deref(), body.title.trim(), model)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /api/conversations/{id}
pub async fn get(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(owned(state.storage()?, &caller, &id).await?))
}

/// DELETE /api/conversations/{id}
pub async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let storage = state.storage()?;
    owned(storage, &caller, &id).await?;
    storage.conversations.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/conversations/{id}/messages
pub async fn messages(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<StoredMessage>>> {
    let storage = state.storage()?;
    owned(storage, &caller, &id).await?;
    Ok(Json(storage.conversations.get_messages(&id).await?))
}

/// POST /api/conversations/{id}/messages
pub async fn add_message(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NewMessage>,
) -> ApiResult<(StatusCode, Json<StoredMessage>)> {
    if !MESSAGE_ROLES.contains(&body.role.as_str()) {
        return Err(Error::validation(format!("unknown role '{}'", body.role)).into());
    }
    if body.content.trim().is_empty() {
        return Err(Error::validation("content is required").into());
    }

    let storage = state.storage()?;
    owned(storage, &caller, &id).await?;
    let message = storage.conversations.add_message(&id, &body.role, &body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
