//! Checkout, the Lava payment webhook and gift code redemption.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::extract::{ApiJson, RequireUser};
use crate::app::AppState;
use crate::billing::{lava, require_package, CreditPackage};
use crate::error::Error;
use crate::storage::{PaymentGrant, PaymentOutcome, Redemption};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(alias = "packageId")]
    pub package_id: String,
}

#[derive(Debug, Serialize)]
pub struct Checkout {
    pub order_id: String,
    pub package: &'static CreditPackage,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

fn grant_for<'a>(package: &'a CreditPackage, user_id: Option<&'a str>) -> PaymentGrant<'a> {
    PaymentGrant {
        user_id,
        package_id: package.id,
        amount_rub: package.price_rub,
        credits: package.credits,
        plan: package.plan,
    }
}

/// GET /api/packages
pub async fn packages() -> Json<&'static [CreditPackage]> {
    Json(crate::billing::PACKAGES)
}

/// POST /api/checkout
pub async fn checkout(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<Checkout>)> {
    let package = require_package(&body.package_id)?;
    let storage = state.storage()?;
    storage.users.require(&user_id).await?;

    let order_id = Uuid::new_v4().to_string();
    storage
        .payments
        .create_pending(lava::PROVIDER, &order_id, &grant_for(package, Some(&user_id)))
        .await?;

    Ok((StatusCode::CREATED, Json(Checkout { order_id, package })))
}

/// POST /api/webhook/lava
pub async fn lava_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    if let Some(expected) = state.config().billing.lava_webhook_key.as_deref() {
        let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            warn!("Rejected Lava webhook with a missing or wrong API key");
            return Err(Error::unauthorized("invalid webhook key").into());
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| Error::validation(format!("webhook body is not JSON: {}", e)))?;
    let event = lava::normalize(&payload)?;

    if !event.is_success() {
        info!("Ignoring Lava event for order {} with status {}", event.order_id, event.status);
        return Ok(Json(json!({ "ok": true, "ignored": true })));
    }

    let storage = state.storage()?;
    let package_id = match event.package_id.clone() {
        Some(id) => id,
        None => storage
            .payments
            .get(lava::PROVIDER, &event.order_id)
            .await?
            .map(|p| p.package_id)
            .ok_or_else(|| Error::validation("webhook payload names no package"))?,
    };
    let package = require_package(&package_id)?;

    let outcome = storage
        .payments
        .complete_and_grant(lava::PROVIDER, &event.order_id, &grant_for(package, event.user_id.as_deref()))
        .await?;

    Ok(Json(match outcome {
        PaymentOutcome::Duplicate => json!({ "ok": true, "duplicate": true }),
        PaymentOutcome::Credited { user_id, credits, balance } => json!({
            "ok": true,
            "user_id": user_id,
            "credits": credits,
            "balance": balance,
        }),
    }))
}

/// POST /api/gift-codes/redeem
pub async fn redeem_gift_code(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    ApiJson(body): ApiJson<RedeemRequest>,
) -> ApiResult<Json<Redemption>> {
    if body.code.trim().is_empty() {
        return Err(Error::validation("code is required").into());
    }
    let storage = state.storage()?;
    storage.users.require(&user_id).await?;
    Ok(Json(storage.gift_codes.redeem(&body.code, &user_id).await?))
}
