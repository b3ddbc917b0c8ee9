//! HTTP surface.

pub mod billing;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod generation;
pub mod monitoring;
pub mod users;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::{AudioRequest, AvatarRequest, TaskRequest, VideoRequest};
use crate::app::AppState;

pub use error::{ApiError, ApiResult};
pub use extract::{ApiJson, RequireUser};

/// Submit, poll and cancel routes for one async task kind.
fn task_routes<R>() -> Router<AppState>
where
    R: TaskRequest + serde::de::DeserializeOwned + 'static,
{
    let base = format!("/api/{}", R::KIND);
    Router::new()
        .route(&base, post(generation::submit::<R>))
        .route(&format!("{}/{{task_id}}", base), get(generation::status::<R>))
        .route(&format!("{}/{{task_id}}/cancel", base), post(generation::cancel::<R>))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/monitoring", get(monitoring::health))
        .route("/api/users", post(users::create))
        .route("/api/users/me", get(users::me))
        .route("/api/chat", post(generation::chat))
        .route("/api/enhance", post(generation::enhance))
        .route("/api/image", post(generation::image))
        .merge(task_routes::<VideoRequest>())
        .merge(task_routes::<AudioRequest>())
        .merge(task_routes::<AvatarRequest>())
        .route("/api/generations", get(generation::history))
        .route("/api/conversations", get(conversations::list).post(conversations::create))
        .route(
            "/api/conversations/{id}",
            get(conversations::get).delete(conversations::delete),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(conversations::messages).post(conversations::add_message),
        )
        .route("/api/packages", get(billing::packages))
        .route("/api/checkout", post(billing::checkout))
        .route("/api/webhook/lava", post(billing::lava_webhook))
        .route("/api/gift-codes/redeem", post(billing::redeem_gift_code))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
