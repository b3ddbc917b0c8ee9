use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::app::config::{CircuitBreakerConfig, ProviderSettings};
use crate::error::{Error, Result};
use crate::providers::circuit_breaker::{BreakerSnapshot, CircuitBreaker};

/// One outbound request to a provider: where it goes, what it sends and how the
/// answer is turned into `Output`.
pub trait ProviderCall: Send + Sync {
    type Output: Send;

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> String;

    /// Request body; `None` sends no body.
    fn payload(&self) -> Option<Value>;

    fn extract(&self, provider: &str, body: Value) -> Result<Self::Output>;

    fn map_error(&self, provider: &str, status: StatusCode, body: &str) -> Error {
        classify_status(provider, status, body)
    }

    /// Overrides the client-wide request timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Map a non-2xx provider status onto the user-facing error categories.
pub fn classify_status(provider: &str, status: StatusCode, body: &str) -> Error {
    let detail = format!("{} {}", status.as_u16(), truncate(body, 500));
    let provider = provider.to_string();

    match status.as_u16() {
        429 => Error::RateLimited { provider, detail },
        402 | 403 | 500..=599 => Error::ProviderUnavailable { provider, detail },
        400..=499 => Error::ProviderRejected { provider, detail },
        _ => Error::ProviderUnknown { provider, detail },
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// HTTP client for a single provider, shared by every adapter that talks to it.
pub struct ProviderClient {
    http: Client,
    name: String,
    api_key: Option<String>,
    base_url: String,
    circuit_breaker: CircuitBreaker,
}

impl ProviderClient {
    pub fn new(
        name: &str,
        settings: &ProviderSettings,
        breaker: &CircuitBreakerConfig,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| Error::unknown(format!("Failed to create HTTP client: {}", e)))?;

        let circuit_breaker = CircuitBreaker::new(
            name,
            breaker.failure_threshold,
            Duration::from_secs(breaker.recovery_timeout_seconds),
        );

        Ok(Self {
            http,
            name: name.to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            circuit_breaker,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn breaker(&self) -> BreakerSnapshot {
        self.circuit_breaker.snapshot()
    }

    fn create_headers(&self, api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| Error::validation(format!("Invalid API key format: {}", e)))?;
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    /// Execute a call. Fails with `NotConfigured` before any I/O when the
    /// provider has no API key.
    pub async fn execute<C: ProviderCall>(&self, call: &C) -> Result<C::Output> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::NotConfigured(self.name.clone()))?;
        let headers = self.create_headers(api_key)?;

        self.circuit_breaker
            .call(|| async {
                let body = self.send(call, headers).await?;
                call.extract(&self.name, body)
            })
            .await
    }

    async fn send<C: ProviderCall>(&self, call: &C, headers: HeaderMap) -> Result<Value> {
        let url = format!("{}{}", self.base_url, call.path());
        debug!("{} {} {}", self.name, call.method(), url);

        let mut request = self.http.request(call.method(), &url).headers(headers);
        if let Some(payload) = call.payload() {
            request = request.json(&payload);
        }
        if let Some(timeout) = call.timeout() {
            request = request.timeout(timeout);
        }

        let start_time = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                Error::provider_unavailable(&self.name, format!("request failed: {}", e))
            } else {
                Error::Http(e)
            }
        })?;
        debug!("{} request completed in {:?}", self.name, start_time.elapsed());

        let status = response.status();
        let text = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            error!("{} API error: {} - {}", self.name, status, truncate(&text, 500));
            return Err(call.map_error(&self.name, status, &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            warn!("{} returned non-JSON body: {}", self.name, e);
            Error::provider_unknown(&self.name, format!("failed to parse response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Echo;

    impl ProviderCall for Echo {
        type Output = String;

        fn path(&self) -> String {
            "/v1/echo".to_string()
        }

        fn payload(&self) -> Option<Value> {
            Some(json!({ "say": "hi" }))
        }

        fn extract(&self, provider: &str, body: Value) -> Result<String> {
            body["said"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::provider_unknown(provider, "missing said"))
        }
    }

    fn settings(base_url: &str, api_key: Option<&str>) -> ProviderSettings {
        ProviderSettings {
            api_key: api_key.map(str::to_string),
            base_url: base_url.to_string(),
            timeout_seconds: 5,
            image_timeout_seconds: 5,
        }
    }

    #[test]
    fn test_classify_status() {
        let classify = |code: u16| classify_status("p", StatusCode::from_u16(code).unwrap(), "");
        assert!(matches!(classify(429), Error::RateLimited { .. }));
        assert!(matches!(classify(402), Error::ProviderUnavailable { .. }));
        assert!(matches!(classify(403), Error::ProviderUnavailable { .. }));
        assert!(matches!(classify(503), Error::ProviderUnavailable { .. }));
        assert!(matches!(classify(422), Error::ProviderRejected { .. }));
        assert!(matches!(classify(302), Error::ProviderUnknown { .. }));
    }

    #[tokio::test]
    async fn test_execute_sends_bearer_and_extracts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/echo"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "said": "hi" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ProviderClient::new(
            "echo",
            &settings(&server.uri(), Some("secret")),
            &CircuitBreakerConfig::default(),
        )
        .unwrap();

        assert_eq!(client.execute(&Echo).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = ProviderClient::new(
            "echo",
            &settings(&server.uri(), None),
            &CircuitBreakerConfig::default(),
        )
        .unwrap();

        assert!(!client.is_configured());
        assert!(matches!(client.execute(&Echo).await, Err(Error::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_provider_error_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "error": "quota" })))
            .mount(&server)
            .await;

        let client = ProviderClient::new(
            "echo",
            &settings(&server.uri(), Some("secret")),
            &CircuitBreakerConfig::default(),
        )
        .unwrap();

        let err = client.execute(&Echo).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }
}
