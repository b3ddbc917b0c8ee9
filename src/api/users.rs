use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::error::ApiResult;
use crate::api::extract::{ApiJson, RequireUser};
use crate::app::AppState;
use crate::error::Error;
use crate::storage::User;

#[derive(Debug, Deserialize, Validate)]
pub struct SignUp {
    #[validate(email(message = "email is not a valid address"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub name: Option<String>,
}

/// POST /api/users
pub async fn create(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignUp>,
) -> ApiResult<(StatusCode, Json<User>)> {
    body.validate().map_err(|e| Error::validation(e.to_string()))?;

    let bonus = state.config().billing.signup_bonus_credits;
    let user = state
        .storage()?
        .users
        .create(&body.email, body.name.as_deref().map(str::trim), bonus)
        .await?;
    info!("Registered user {} with {} bonus credits", user.id, bonus);
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users/me
pub async fn me(State(state): State<AppState>, RequireUser(user_id): RequireUser) -> ApiResult<Json<User>> {
    Ok(Json(state.storage()?.users.require(&user_id).await?))
}
