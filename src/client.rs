//! HTTP client for this service's task endpoints.
//!
//! Lets the task awaiter drive a generation running on a remote server the
//! same way the server drives Replicate.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::generation::{GenerationTask, TaskBackend, TaskHandle};
use crate::providers::classify_status;

const CLIENT_NAME: &str = "creative-studio";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

pub struct StudioClient {
    http: Client,
    base_url: String,
    user_id: Option<String>,
}

impl StudioClient {
    pub fn new(base_url: &str, user_id: Option<String>, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| Error::validation(format!("invalid server URL '{}': {}", base_url, e)))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::unknown(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
        })
    }

    fn task_url(&self, handle: &TaskHandle) -> String {
        format!("{}/api/{}/{}", self.base_url, handle.kind, handle.id)
    }

    fn with_user(&self, request: RequestBuilder) -> RequestBuilder {
        match self.user_id.as_deref() {
            Some(user_id) => request.header("X-User-Id", user_id),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<GenerationTask> {
        let response = self.with_user(request).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                Error::provider_unavailable(CLIENT_NAME, e.to_string())
            } else {
                Error::Http(e)
            }
        })?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        debug!("Server answered {}: {}", status, body);
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) if err.code == "NOT_FOUND" => Err(Error::not_found(err.error)),
            Ok(err) if err.code == "UNAUTHORIZED" => Err(Error::unauthorized(err.error)),
            Ok(err) => Err(classify_status(CLIENT_NAME, status, &format!("{}: {}", err.code, err.error))),
            Err(_) => Err(classify_status(CLIENT_NAME, status, &body)),
        }
    }
}

#[async_trait]
impl TaskBackend for StudioClient {
    async fn poll(&self, handle: &TaskHandle) -> Result<GenerationTask> {
        self.send(self.http.get(self.task_url(handle))).await
    }

    async fn cancel(&self, handle: &TaskHandle) -> Result<()> {
        self.send(self.http.post(format!("{}/cancel", self.task_url(handle))))
            .await
            .map(|_| ())
    }
}
