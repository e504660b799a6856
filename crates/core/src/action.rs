use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::UpstreamError;

/// A structured instruction destined for the execution backend, produced
/// either by the prompt interpreter or assembled directly by a typed handler
/// (webhook, upload, payout). `params` is an opaque bag the backend validates;
/// the router never branches on its contents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    pub params: Value,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self { action: action.into(), params }
    }
}

/// Uniform response envelope relayed to the original caller.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ForwardResult {
    Success { success: bool, action: String, result: Value },
    Failure { error: String },
}

impl ForwardResult {
    pub fn success(action: impl Into<String>, result: Value) -> Self {
        Self::Success { success: true, action: action.into(), result }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure { error: error.into() }
    }
}

/// The single trusted seam between the router and the service that performs
/// state-changing business operations. Implementations carry a
/// service-to-service credential, never the end user's token.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(&self, request: &ActionRequest) -> Result<Value, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ActionRequest, ForwardResult};

    #[test]
    fn action_request_round_trips_through_json() {
        let request = ActionRequest::new(
            "createProgram",
            json!({"title": "Tax Prep Training", "tuition": 2500}),
        );
        let encoded = serde_json::to_string(&request).expect("encodes");
        let decoded: ActionRequest = serde_json::from_str(&encoded).expect("decodes");
        assert_eq!(decoded, request);
    }

    #[test]
    fn success_envelope_carries_action_and_result() {
        let envelope = ForwardResult::success("getStats", json!({"students": 42}));
        let encoded = serde_json::to_value(&envelope).expect("encodes");
        assert_eq!(encoded["success"], json!(true));
        assert_eq!(encoded["action"], json!("getStats"));
        assert_eq!(encoded["result"]["students"], json!(42));
    }

    #[test]
    fn failure_envelope_is_a_bare_error_object() {
        let envelope = ForwardResult::failure("backend unreachable");
        let encoded = serde_json::to_value(&envelope).expect("encodes");
        assert_eq!(encoded, json!({"error": "backend unreachable"}));
    }
}
