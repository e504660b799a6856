use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use opsgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use opsgate_core::{authorize, ForwardResult};

use crate::auth::{caller_identity, require_bearer};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AgentPromptRequest {
    pub prompt: Option<String>,
}

/// `POST /api/agent` — the full pipeline: authenticate, interpret the free
/// text into an action, authorize it against the catalog, forward it to the
/// execution backend, and relay the backend's result.
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AgentPromptRequest>, JsonRejection>,
) -> Result<Json<ForwardResult>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    require_bearer(&headers)?;
    let caller = caller_identity(&headers)?;
    let Json(body) = body?;
    let actor = caller.roles_label();

    let prompt = body
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing prompt"))?;

    let request = match state.interpreter.interpret(prompt).await {
        Ok(request) => request,
        Err(error) => {
            state.audit.emit(
                AuditEvent::new(
                    &correlation_id,
                    "agent.interpret_failed",
                    AuditCategory::Interpret,
                    &actor,
                    AuditOutcome::Failed,
                )
                .with_metadata("reason", error.reason_code()),
            );
            return Err(error.into());
        }
    };

    if let Err(rejection) = authorize(&state.catalog, &request, &caller) {
        state.audit.emit(
            AuditEvent::new(
                &correlation_id,
                "agent.action_rejected",
                AuditCategory::Authorize,
                &actor,
                AuditOutcome::Rejected,
            )
            .with_action(&request.action)
            .with_metadata("reason", rejection.reason_code()),
        );
        return Err(rejection.into());
    }

    let result: Value = match state.backend.execute(&request).await {
        Ok(result) => result,
        Err(error) => {
            state.audit.emit(
                AuditEvent::new(
                    &correlation_id,
                    "agent.forward_failed",
                    AuditCategory::Forward,
                    &actor,
                    AuditOutcome::Failed,
                )
                .with_action(&request.action)
                .with_metadata("upstream", error.service),
            );
            return Err(error.into());
        }
    };

    state.audit.emit(
        AuditEvent::new(
            &correlation_id,
            "agent.action_forwarded",
            AuditCategory::Forward,
            &actor,
            AuditOutcome::Success,
        )
        .with_action(&request.action),
    );
    info!(
        event_name = "agent.action_forwarded",
        correlation_id = %correlation_id,
        action = %request.action,
        "agent action executed"
    );

    Ok(Json(ForwardResult::success(request.action, result)))
}
