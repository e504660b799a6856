use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use opsgate_core::config::LlmConfig;
use opsgate_core::UpstreamError;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, UpstreamError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatReply {
    result: Option<ChatResult>,
    response: Option<String>,
}

#[derive(Deserialize)]
struct ChatResult {
    response: Option<String>,
}

/// Inference-endpoint client. Favors determinism over creativity: low
/// temperature, short completions. The completion call is idempotent, so
/// transient failures are retried a bounded number of times with jittered
/// backoff; the retry budget comes from configuration.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_token: SecretString,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 512;

impl HttpLlmClient {
    pub fn new(http: reqwest::Client, config: &LlmConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        }
    }

    async fn complete_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, UpstreamError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .http
            .post(format!("{}/ai/run/{}", self.base_url, self.model))
            .bearer_auth(self.api_token.expose_secret())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|error| UpstreamError::transport("model", error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new("model", Some(status.as_u16()), body));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|error| UpstreamError::transport("model", error.to_string()))?;

        reply
            .result
            .and_then(|result| result.response)
            .or(reply.response)
            .ok_or_else(|| UpstreamError::new("model", None, "reply carried no completion text"))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = 200u64.saturating_mul(1 << attempt.min(4));
        let jitter_ms = rand::thread_rng().gen_range(0..=base_ms / 2);
        Duration::from_millis(base_ms + jitter_ms)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, UpstreamError> {
        let mut attempt = 0;
        loop {
            match self.complete_once(system_prompt, user_prompt).await {
                Ok(text) => return Ok(text),
                Err(error) if attempt < self.max_retries => {
                    warn!(
                        event_name = "agent.llm.retry",
                        attempt,
                        error = %error,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Convenience for tests elsewhere in the workspace: a client that replays a
/// fixed reply and records the prompts it was given.
pub struct ScriptedLlmClient {
    reply: Result<String, UpstreamError>,
    calls: std::sync::Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self { reply: Ok(reply.into()), calls: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn failing(error: UpstreamError) -> Self {
        Self { reply: Err(error), calls: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn user_prompts(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, UpstreamError> {
        self.calls.lock().expect("calls lock").push(user_prompt.to_string());
        self.reply.clone()
    }
}

#[cfg(test)]
mod tests {
    use opsgate_core::UpstreamError;

    use super::{LlmClient, ScriptedLlmClient};

    #[tokio::test]
    async fn scripted_client_replays_reply_and_records_prompts() {
        let client = ScriptedLlmClient::replying(r#"{"action":"getStats","params":{}}"#);
        let reply = client.complete("system", "show me the stats").await.expect("reply");
        assert!(reply.contains("getStats"));
        assert_eq!(client.user_prompts(), vec!["show me the stats".to_string()]);
    }

    #[tokio::test]
    async fn scripted_client_replays_failures() {
        let client = ScriptedLlmClient::failing(UpstreamError::transport("model", "timeout"));
        let error = client.complete("system", "anything").await.unwrap_err();
        assert_eq!(error.service, "model");
    }
}
