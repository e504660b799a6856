use thiserror::Error;

use crate::authorize::AuthzRejection;

/// A non-success reply or transport failure from an external collaborator
/// (model endpoint, execution backend, payment provider, object store).
/// The upstream message is preserved for operator debuggability; callers must
/// never place secrets in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamError {
    pub service: &'static str,
    pub status: Option<u16>,
    pub message: String,
}

impl std::error::Error for UpstreamError {}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => {
                write!(f, "{} call failed ({status}): {}", self.service, self.message)
            }
            None => write!(f, "{} call failed: {}", self.service, self.message),
        }
    }
}

impl UpstreamError {
    pub fn new(service: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self { service, status, message: message.into() }
    }

    pub fn transport(service: &'static str, message: impl Into<String>) -> Self {
        Self::new(service, None, message)
    }
}

/// The router's full failure taxonomy. Every handler converts its failures
/// into one of these before the transport layer sees them; the server crate
/// maps each variant onto an HTTP status and a `{error}` JSON body.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("Unauthorized")]
    Authentication,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Authorization(#[from] AuthzRejection),
    #[error("Webhook signature verification failed")]
    Signature,
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl RouterError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable code, used in audit metadata and logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Authentication => "unauthenticated",
            Self::Validation(_) => "invalid_request",
            Self::Authorization(rejection) => rejection.reason_code(),
            Self::Signature => "bad_signature",
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::authorize::AuthzRejection;

    use super::{RouterError, UpstreamError};

    #[test]
    fn upstream_error_formats_status_when_present() {
        let with_status = UpstreamError::new("stripe", Some(402), "card declined");
        assert_eq!(with_status.to_string(), "stripe call failed (402): card declined");

        let transport = UpstreamError::transport("backend", "connection refused");
        assert_eq!(transport.to_string(), "backend call failed: connection refused");
    }

    #[test]
    fn authorization_rejections_keep_their_reason_codes() {
        let unknown: RouterError =
            AuthzRejection::UnknownAction { action: "zap".to_string() }.into();
        assert_eq!(unknown.reason_code(), "unknown_action");

        let forbidden: RouterError = AuthzRejection::Forbidden {
            action: "runPayoutBatch".to_string(),
            roles: "staff".to_string(),
        }
        .into();
        assert_eq!(forbidden.reason_code(), "forbidden");
    }

    #[test]
    fn taxonomy_reason_codes_are_distinct() {
        let codes = [
            RouterError::Authentication.reason_code(),
            RouterError::validation("missing prompt").reason_code(),
            RouterError::Signature.reason_code(),
            RouterError::NotFound("file".to_string()).reason_code(),
            RouterError::Upstream(UpstreamError::transport("model", "timeout")).reason_code(),
        ];
        let unique: std::collections::BTreeSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
