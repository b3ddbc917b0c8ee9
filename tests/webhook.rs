use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use creative_studio::access::Tier;
use creative_studio::api;
use creative_studio::app::{AppConfig, AppState};
use creative_studio::storage::{Database, Storage};

async fn setup(webhook_key: Option<&str>) -> (Router, Storage, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}", dir.path().join("studio.db").display());
    let storage = Storage::new(Database::connect(&url, 2).await.unwrap());

    let mut config = AppConfig::default();
    config.billing.lava_webhook_key = webhook_key.map(str::to_string);
    let app = api::router(AppState::with_storage(config, Some(storage.clone())).unwrap());
    (app, storage, dir)
}

async fn post(app: &Router, uri: &str, headers: &[(&str, &str)], body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn duplicate_delivery_credits_once() {
    let (app, storage, _dir) = setup(None).await;
    let user = storage.users.create("buyer@test.io", None, 0).await.unwrap();

    let event = json!({
        "status": "success",
        "contractId": "lava-1001",
        "customFields": format!("{{\"userId\":\"{}\",\"packageId\":\"creator\"}}", user.id),
    });

    let (status, first) = post(&app, "/api/webhook/lava", &[], event.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["ok"], true);
    assert_eq!(first["credits"], 250);

    let (status, second) = post(&app, "/api/webhook/lava", &[], event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["duplicate"], true);

    let user = storage.users.require(&user.id).await.unwrap();
    assert_eq!(user.credit_balance, 250);
    assert_eq!(user.plan, Tier::Creator);
}

#[tokio::test]
async fn checkout_then_webhook_without_custom_fields() {
    let (app, storage, _dir) = setup(None).await;
    let user = storage.users.create("checkout@test.io", None, 5).await.unwrap();

    let (status, checkout) = post(
        &app,
        "/api/checkout",
        &[("X-User-Id", user.id.as_str())],
        json!({ "package_id": "start-pack" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(checkout["package"]["credits"], 100);
    let order_id = checkout["order_id"].as_str().unwrap();

    let (status, _) = post(
        &app,
        "/api/webhook/lava",
        &[],
        json!({ "status": "success", "order_id": order_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(storage.ledger.balance(&user.id).await.unwrap(), 105);
}

#[tokio::test]
async fn webhook_key_and_non_success_statuses() {
    let (app, storage, _dir) = setup(Some("s3cret")).await;
    let user = storage.users.create("keyed@test.io", None, 0).await.unwrap();
    let event = json!({
        "status": "success",
        "order_id": "lava-2002",
        "custom_fields": { "user_id": user.id, "package_id": "maximal" },
    });

    let (status, body) = post(&app, "/api/webhook/lava", &[("X-Api-Key", "wrong")], event.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let failed = json!({ "status": "failed", "order_id": "lava-2002" });
    let (status, body) = post(&app, "/api/webhook/lava", &[("X-Api-Key", "s3cret")], failed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ignored"], true);
    assert_eq!(storage.ledger.balance(&user.id).await.unwrap(), 0);

    let (status, _) = post(&app, "/api/webhook/lava", &[("X-Api-Key", "s3cret")], event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(storage.ledger.balance(&user.id).await.unwrap(), 1600);
}

#[tokio::test]
async fn gift_code_redeems_once() {
    let (app, storage, _dir) = setup(None).await;
    let user = storage.users.create("gift@test.io", None, 0).await.unwrap();
    storage.gift_codes.create("WELCOME50", 50, None).await.unwrap();

    let headers = [("X-User-Id", user.id.as_str())];
    let (status, body) = post(&app, "/api/gift-codes/redeem", &headers, json!({ "code": " welcome50 " })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 50);

    let (status, _) = post(&app, "/api/gift-codes/redeem", &headers, json!({ "code": "WELCOME50" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post(&app, "/api/gift-codes/redeem", &headers, json!({ "code": "NOPE" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
