//! Lava payment webhook payloads.
//!
//! Lava has shipped several payload shapes: snake_case and camelCase keys, the
//! order id under `order_id`, `orderId` or `contractId`, and custom fields as
//! an object or as a JSON-encoded string. `normalize` folds them into one.

use serde_json::Value;

use crate::error::{Error, Result};

pub const PROVIDER: &str = "lava";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LavaEvent {
    pub status: String,
    pub order_id: String,
    pub user_id: Option<String>,
    pub package_id: Option<String>,
}

impl LavaEvent {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn custom_fields(body: &Value) -> Option<Value> {
    let raw = body.get("custom_fields").or_else(|| body.get("customFields"))?;
    match raw {
        Value::Object(_) => Some(raw.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_object),
        _ => None,
    }
}

pub fn normalize(body: &Value) -> Result<LavaEvent> {
    let status = string_field(body, &["status"])
        .ok_or_else(|| Error::validation("webhook payload has no status"))?;
    let order_id = string_field(body, &["order_id", "orderId", "contractId", "contract_id"])
        .ok_or_else(|| Error::validation("webhook payload has no order id"))?;

    let fields = custom_fields(body);
    let from_fields = |keys: &[&str]| fields.as_ref().and_then(|f| string_field(f, keys));

    Ok(LavaEvent {
        status,
        order_id,
        user_id: from_fields(&["user_id", "userId"]).or_else(|| string_field(body, &["user_id"])),
        package_id: from_fields(&["package_id", "packageId"])
            .or_else(|| string_field(body, &["package_id"])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_case_with_object_fields() {
        let event = normalize(&json!({
            "status": "success",
            "order_id": "ord-1",
            "custom_fields": { "user_id": "u1", "package_id": "creator" }
        }))
        .unwrap();
        assert!(event.is_success());
        assert_eq!(event.order_id, "ord-1");
        assert_eq!(event.user_id.as_deref(), Some("u1"));
        assert_eq!(event.package_id.as_deref(), Some("creator"));
    }

    #[test]
    fn test_camel_case_with_string_fields() {
        let event = normalize(&json!({
            "status": "Success",
            "contractId": "c-77",
            "customFields": "{\"userId\":\"u2\",\"packageId\":\"maximal\"}"
        }))
        .unwrap();
        assert!(event.is_success());
        assert_eq!(event.order_id, "c-77");
        assert_eq!(event.user_id.as_deref(), Some("u2"));
        assert_eq!(event.package_id.as_deref(), Some("maximal"));
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(normalize(&json!({ "order_id": "x" })).is_err());
        assert!(normalize(&json!({ "status": "success" })).is_err());

        let failed = normalize(&json!({ "status": "failed", "orderId": 15 })).unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.order_id, "15");
        assert!(failed.user_id.is_none());
    }
}
