use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use opsgate_core::{ActionRequest, UpstreamError};

use crate::llm::LlmClient;

/// Fixed system instruction enumerating the valid actions, with example
/// input/output pairs per action family. The model must answer with a single
/// JSON object; the interpreter tolerates surrounding prose anyway.
const SYSTEM_PROMPT: &str = r#"You are the operations autopilot for a workforce-training platform. Respond ONLY in valid JSON format: { "action": "string", "params": {} }

Available actions:
- createProgram: Create new training program (params: title, tuition, hours, cip_code)
- updateTuition: Update program tuition (params: id, amount)
- createAffiliate: Add affiliate partner (params: user_id, tier)
- addStudent: Enroll student (params: student_id, program_id)
- getETPLReport: Generate ETPL/compliance report (params: type)
- createReferral: Create referral (params: affiliate_id, client_name, source)
- calculateCommission: Calculate commission (params: referral_id, basis_amount, percent)
- runPayoutBatch: Process payouts (params: cutoff_date)
- updateEnrollment: Modify enrollment (params: enrollment_id, status)
- getStats: Get dashboard stats (params: {})

Examples:
User: "Create a new Tax Prep Training program for $2500 tuition"
Response: {"action":"createProgram","params":{"title":"Tax Prep Training","tuition":2500,"hours":120,"cip_code":"52.0302"}}

User: "Update tuition for program abc123 to $3000"
Response: {"action":"updateTuition","params":{"id":"abc123","amount":3000}}

User: "Generate the ETPL report"
Response: {"action":"getETPLReport","params":{"type":"etpl"}}

IMPORTANT: Respond with ONLY the JSON object, no other text."#;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterpretError {
    #[error("Missing prompt")]
    EmptyPrompt,
    #[error("Prompt exceeds {limit} bytes")]
    PromptTooLong { limit: usize },
    #[error(transparent)]
    Model(#[from] UpstreamError),
    #[error("No JSON object found in model response")]
    BadJson,
    #[error("Model response is missing a string `action` or object `params`")]
    BadShape,
}

impl InterpretError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "missing_prompt",
            Self::PromptTooLong { .. } => "prompt_too_long",
            Self::Model(_) => "model_failure",
            Self::BadJson => "bad_json",
            Self::BadShape => "bad_shape",
        }
    }
}

/// Pure text-to-structure transform with one external call. Never authorizes
/// or executes; the gate and forwarder own those decisions.
pub struct PromptInterpreter {
    llm: Arc<dyn LlmClient>,
    max_prompt_bytes: usize,
}

impl PromptInterpreter {
    pub fn new(llm: Arc<dyn LlmClient>, max_prompt_bytes: usize) -> Self {
        Self { llm, max_prompt_bytes }
    }

    pub async fn interpret(&self, prompt: &str) -> Result<ActionRequest, InterpretError> {
        let trimmed = prompt.trim();
        if trimmed.is_empty() {
            return Err(InterpretError::EmptyPrompt);
        }
        if trimmed.len() > self.max_prompt_bytes {
            return Err(InterpretError::PromptTooLong { limit: self.max_prompt_bytes });
        }

        let reply = self.llm.complete(SYSTEM_PROMPT, trimmed).await?;
        debug!(event_name = "agent.interpret.reply_received", bytes = reply.len(), "model replied");

        let json_text = extract_json_object(&reply).ok_or(InterpretError::BadJson)?;
        let parsed: Value = serde_json::from_str(json_text).map_err(|_| InterpretError::BadJson)?;

        into_action_request(parsed)
    }
}

fn into_action_request(value: Value) -> Result<ActionRequest, InterpretError> {
    let object = value.as_object().ok_or(InterpretError::BadShape)?;
    let action = object
        .get("action")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or(InterpretError::BadShape)?;
    let params = object.get("params").filter(|params| params.is_object()).cloned();
    let params = params.ok_or(InterpretError::BadShape)?;
    Ok(ActionRequest::new(action, params))
}

/// Locate the first top-level `{...}` in a reply that may carry leading or
/// trailing prose. The scan is string- and escape-aware so braces inside JSON
/// string values do not unbalance the depth count.
fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in reply[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&reply[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use opsgate_core::UpstreamError;

    use crate::llm::ScriptedLlmClient;

    use super::{extract_json_object, InterpretError, PromptInterpreter};

    fn interpreter(reply: &str) -> PromptInterpreter {
        PromptInterpreter::new(Arc::new(ScriptedLlmClient::replying(reply)), 4096)
    }

    #[tokio::test]
    async fn bare_json_reply_parses() {
        let interpreter = interpreter(
            r#"{"action":"createProgram","params":{"title":"Tax Prep Training","tuition":2500}}"#,
        );
        let request = interpreter
            .interpret("Create a new Tax Prep Training program for $2500 tuition")
            .await
            .expect("interprets");
        assert_eq!(request.action, "createProgram");
        assert_eq!(request.params, json!({"title": "Tax Prep Training", "tuition": 2500}));
    }

    #[tokio::test]
    async fn prose_wrapped_object_is_extracted() {
        let interpreter = interpreter(
            "Sure! Here is the structured command you asked for:\n\
             {\"action\":\"getStats\",\"params\":{}}\n\
             Let me know if you need anything else.",
        );
        let request = interpreter.interpret("show stats").await.expect("interprets");
        assert_eq!(request.action, "getStats");
    }

    #[tokio::test]
    async fn reply_without_object_is_bad_json() {
        let interpreter = interpreter("I cannot help with that request.");
        let error = interpreter.interpret("do something").await.unwrap_err();
        assert_eq!(error, InterpretError::BadJson);
        assert_eq!(error.reason_code(), "bad_json");
    }

    #[tokio::test]
    async fn unbalanced_object_is_bad_json() {
        let interpreter = interpreter(r#"{"action":"getStats","params":{"#);
        let error = interpreter.interpret("show stats").await.unwrap_err();
        assert_eq!(error, InterpretError::BadJson);
    }

    #[tokio::test]
    async fn missing_action_field_is_bad_shape() {
        let interpreter = interpreter(r#"{"params":{}}"#);
        let error = interpreter.interpret("do it").await.unwrap_err();
        assert_eq!(error, InterpretError::BadShape);
    }

    #[tokio::test]
    async fn non_object_params_is_bad_shape() {
        let interpreter = interpreter(r#"{"action":"getStats","params":"everything"}"#);
        let error = interpreter.interpret("stats please").await.unwrap_err();
        assert_eq!(error, InterpretError::BadShape);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_a_model_call() {
        let client = Arc::new(ScriptedLlmClient::replying("{}"));
        let interpreter = PromptInterpreter::new(client.clone(), 4096);
        let error = interpreter.interpret("   ").await.unwrap_err();
        assert_eq!(error, InterpretError::EmptyPrompt);
        assert!(client.user_prompts().is_empty());
    }

    #[tokio::test]
    async fn oversized_prompt_is_rejected_without_a_model_call() {
        let client = Arc::new(ScriptedLlmClient::replying("{}"));
        let interpreter = PromptInterpreter::new(client.clone(), 16);
        let error = interpreter.interpret(&"x".repeat(17)).await.unwrap_err();
        assert_eq!(error, InterpretError::PromptTooLong { limit: 16 });
        assert!(client.user_prompts().is_empty());
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let client = Arc::new(ScriptedLlmClient::failing(UpstreamError::transport(
            "model",
            "connection reset",
        )));
        let interpreter = PromptInterpreter::new(client, 4096);
        let error = interpreter.interpret("stats").await.unwrap_err();
        assert_eq!(error.reason_code(), "model_failure");
    }

    #[test]
    fn extraction_ignores_braces_inside_strings() {
        let reply = r#"prefix {"action":"createProgram","params":{"title":"a {weird} title"}} suffix"#;
        let extracted = extract_json_object(reply).expect("object found");
        assert!(extracted.ends_with("}}"));
        let value: serde_json::Value = serde_json::from_str(extracted).expect("valid json");
        assert_eq!(value["params"]["title"], "a {weird} title");
    }

    #[test]
    fn extraction_stops_at_the_first_top_level_object() {
        let reply = r#"{"action":"getStats","params":{}} and also {"action":"other","params":{}}"#;
        let extracted = extract_json_object(reply).expect("object found");
        assert_eq!(extracted, r#"{"action":"getStats","params":{}}"#);
    }
}
