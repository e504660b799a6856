use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use opsgate_core::config::BackendConfig;
use opsgate_core::{ActionRequest, ExecutionBackend, UpstreamError};

/// Forwards authorized actions to the trusted execution backend with the
/// service-to-service credential. A pure relay: it never inspects or branches
/// on `params`, never retries, and surfaces backend failures verbatim.
pub struct HttpExecutionBackend {
    http: reqwest::Client,
    base_url: String,
    service_token: SecretString,
    timeout: Duration,
}

impl HttpExecutionBackend {
    pub fn new(http: reqwest::Client, config: &BackendConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_token: config.service_token.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl ExecutionBackend for HttpExecutionBackend {
    async fn execute(&self, request: &ActionRequest) -> Result<Value, UpstreamError> {
        debug!(
            event_name = "forward.execute",
            action = %request.action,
            "forwarding action to execution backend"
        );

        let response = self
            .http
            .post(format!("{}/executeAction", self.base_url))
            .bearer_auth(self.service_token.expose_secret())
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|error| UpstreamError::transport("backend", error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new("backend", Some(status.as_u16()), body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| UpstreamError::transport("backend", error.to_string()))
    }
}

/// Backend double for the workspace test suites: replays a scripted payload
/// and records every forwarded action so tests can assert exact call counts.
pub struct RecordingBackend {
    reply: Result<Value, UpstreamError>,
    calls: std::sync::Mutex<Vec<ActionRequest>>,
}

impl RecordingBackend {
    pub fn replying(reply: Value) -> Self {
        Self { reply: Ok(reply), calls: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn failing(error: UpstreamError) -> Self {
        Self { reply: Err(error), calls: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<ActionRequest> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ExecutionBackend for RecordingBackend {
    async fn execute(&self, request: &ActionRequest) -> Result<Value, UpstreamError> {
        self.calls.lock().expect("calls lock").push(request.clone());
        self.reply.clone()
    }
}
