use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use opsgate_core::CallerIdentity;

use crate::error::ApiError;

/// Header carrying the caller's role list, set by the upstream auth
/// middleware. Replacing this with roles derived from verified token claims
/// only touches [`caller_identity`].
pub const ROLES_HEADER: &str = "x-user-roles";

/// Extract the bearer credential, rejecting missing or malformed headers
/// before any other processing.
pub fn require_bearer(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(ApiError::unauthorized)?;
    let token = value.strip_prefix("Bearer ").ok_or_else(ApiError::unauthorized)?;
    if token.trim().is_empty() {
        return Err(ApiError::unauthorized());
    }
    Ok(token.to_string())
}

/// Derive the caller's role set. A missing or blank roles header yields no
/// roles and therefore fails, rather than defaulting to a privileged role.
pub fn caller_identity(headers: &HeaderMap) -> Result<CallerIdentity, ApiError> {
    let value = headers
        .get(ROLES_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(ApiError::unauthorized)?;
    Ok(CallerIdentity::from_header_value(value)?)
}

#[cfg(test)]
mod tests {
    use axum::http::header::AUTHORIZATION;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};

    use super::{caller_identity, require_bearer, ROLES_HEADER};

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        assert_eq!(require_bearer(&headers).unwrap(), "tok-1");
    }

    #[test]
    fn missing_or_malformed_authorization_is_401() {
        let headers = HeaderMap::new();
        assert_eq!(require_bearer(&headers).unwrap_err().status, StatusCode::UNAUTHORIZED);

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(require_bearer(&basic).unwrap_err().status, StatusCode::UNAUTHORIZED);

        let mut empty = HeaderMap::new();
        empty.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(require_bearer(&empty).unwrap_err().status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn missing_roles_header_does_not_default_to_a_role() {
        let headers = HeaderMap::new();
        assert_eq!(caller_identity(&headers).unwrap_err().status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn roles_header_parses_into_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(ROLES_HEADER, HeaderValue::from_static("admin,staff"));
        let identity = caller_identity(&headers).unwrap();
        assert!(identity.has_role("admin"));
        assert!(identity.has_role("staff"));
    }
}
