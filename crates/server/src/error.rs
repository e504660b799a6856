use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use opsgate_agent::InterpretError;
use opsgate_core::authorize::AuthzRejection;
use opsgate_core::errors::{RouterError, UpstreamError};
use opsgate_core::identity::IdentityError;

/// Transport-facing error wrapper. Every handler failure becomes one of
/// these, and every one of these becomes a JSON `{error}` body with the most
/// specific status known; no handler lets an exception reach the transport
/// layer unconverted.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub reason_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, reason_code: &'static str) -> Self {
        Self { status, message: message.into(), reason_code }
    }

    pub fn unauthorized() -> Self {
        Self::from(RouterError::Authentication)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from(RouterError::Validation(message.into()))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::from(RouterError::NotFound(what.into()))
    }
}

impl From<RouterError> for ApiError {
    fn from(error: RouterError) -> Self {
        let status = match &error {
            RouterError::Authentication => StatusCode::UNAUTHORIZED,
            RouterError::Validation(_) | RouterError::Signature => StatusCode::BAD_REQUEST,
            RouterError::Authorization(AuthzRejection::UnknownAction { .. }) => {
                StatusCode::BAD_REQUEST
            }
            RouterError::Authorization(AuthzRejection::Forbidden { .. }) => StatusCode::FORBIDDEN,
            RouterError::NotFound(_) => StatusCode::NOT_FOUND,
            RouterError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: error.to_string(), reason_code: error.reason_code() }
    }
}

impl From<AuthzRejection> for ApiError {
    fn from(rejection: AuthzRejection) -> Self {
        RouterError::from(rejection).into()
    }
}

impl From<UpstreamError> for ApiError {
    fn from(error: UpstreamError) -> Self {
        RouterError::from(error).into()
    }
}

impl From<IdentityError> for ApiError {
    fn from(_: IdentityError) -> Self {
        RouterError::Authentication.into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        RouterError::Validation(rejection.body_text()).into()
    }
}

impl From<InterpretError> for ApiError {
    fn from(error: InterpretError) -> Self {
        match error {
            InterpretError::Model(upstream) => RouterError::from(upstream).into(),
            other => {
                let reason_code = other.reason_code();
                Self::new(StatusCode::BAD_REQUEST, other.to_string(), reason_code)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use opsgate_agent::InterpretError;
    use opsgate_core::authorize::AuthzRejection;
    use opsgate_core::errors::{RouterError, UpstreamError};

    use super::ApiError;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(ApiError::unauthorized().status, StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::bad_request("bad").status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("file").status, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(RouterError::Signature).status, StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(UpstreamError::transport("backend", "refused")).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unknown_action_is_bad_request_and_forbidden_is_forbidden() {
        let unknown = ApiError::from(AuthzRejection::UnknownAction { action: "zap".into() });
        assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
        assert!(unknown.message.contains("zap"));

        let forbidden = ApiError::from(AuthzRejection::Forbidden {
            action: "runPayoutBatch".into(),
            roles: "staff".into(),
        });
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn interpreter_model_failures_are_internal_but_shape_failures_are_client_errors() {
        let model = ApiError::from(InterpretError::Model(UpstreamError::transport(
            "model", "timeout",
        )));
        assert_eq!(model.status, StatusCode::INTERNAL_SERVER_ERROR);

        let shape = ApiError::from(InterpretError::BadShape);
        assert_eq!(shape.status, StatusCode::BAD_REQUEST);
        assert_eq!(shape.reason_code, "bad_shape");
    }
}
