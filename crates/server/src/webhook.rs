use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use opsgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use opsgate_core::errors::RouterError;
use opsgate_core::ActionRequest;

use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureRejection {
    #[error("signature header missing")]
    MissingHeader,
    #[error("signature header malformed")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("signature digest mismatch")]
    DigestMismatch,
}

/// Validate a provider signature header of the form `t=<unix>,v1=<hex>`.
/// The signed payload is `"{t}.{body}"`; the digest comparison is
/// constant-time and the timestamp must fall within the tolerance window.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    tolerance_secs: u64,
    now_unix: i64,
) -> Result<(), SignatureRejection> {
    let mut timestamp: Option<i64> = None;
    let mut digests: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(decoded) = hex::decode(value) {
                    digests.push(decoded);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureRejection::MalformedHeader)?;
    if digests.is_empty() {
        return Err(SignatureRejection::MalformedHeader);
    }
    if (now_unix - timestamp).unsigned_abs() > tolerance_secs {
        return Err(SignatureRejection::TimestampOutOfTolerance);
    }

    for digest in &digests {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(body);
        if mac.verify_slice(digest).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureRejection::DigestMismatch)
}

/// Map a recognized provider event onto the backend action it should trigger.
/// Unrecognized event types are accepted and ignored.
pub fn action_for_event(event: &Value) -> Option<ActionRequest> {
    let event_type = event.get("type")?.as_str()?;
    let object = event.pointer("/data/object").cloned().unwrap_or(Value::Null);
    match event_type {
        "checkout.session.completed" => {
            Some(ActionRequest::new("postStripeCheckout", json!({ "session": object })))
        }
        "payment_intent.succeeded" => {
            Some(ActionRequest::new("postPayment", json!({ "payment_intent": object })))
        }
        _ => None,
    }
}

/// `POST /webhooks/stripe` — validate the provider signature over the raw
/// body before trusting anything, then forward the mapped action. Zero side
/// effects happen before the signature check passes.
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(SignatureRejection::MissingHeader)
        .and_then(|header| {
            verify_signature(
                state.webhook_secret.expose_secret(),
                header,
                &body,
                state.webhook_tolerance_secs,
                chrono::Utc::now().timestamp(),
            )
        })
        .map_err(|rejection| {
            state.audit.emit(
                AuditEvent::new(
                    &correlation_id,
                    "webhook.signature_rejected",
                    AuditCategory::Payment,
                    "stripe",
                    AuditOutcome::Rejected,
                )
                .with_metadata("rejection", rejection.to_string()),
            );
            RouterError::Signature
        })?;

    let event: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("Webhook body is not valid JSON"))?;

    let Some(request) = action_for_event(&event) else {
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
        info!(
            event_name = "webhook.event_ignored",
            correlation_id = %correlation_id,
            event_type,
            "unrecognized webhook event type"
        );
        return Ok("ok");
    };

    state.backend.execute(&request).await?;

    state.audit.emit(
        AuditEvent::new(
            &correlation_id,
            "webhook.event_forwarded",
            AuditCategory::Payment,
            "stripe",
            AuditOutcome::Success,
        )
        .with_action(&request.action),
    );

    Ok("ok")
}

#[cfg(test)]
mod tests {
    use hmac::{Hmac, Mac};
    use serde_json::json;
    use sha2::Sha256;

    use super::{action_for_event, verify_signature, SignatureRejection};

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("key");
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(body);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign("whsec_test", 1_700_000_000, body);
        assert_eq!(verify_signature("whsec_test", &header, body, 300, 1_700_000_010), Ok(()));
    }

    #[test]
    fn wrong_secret_is_a_digest_mismatch() {
        let body = b"{}";
        let header = sign("other_secret", 1_700_000_000, body);
        assert_eq!(
            verify_signature("whsec_test", &header, body, 300, 1_700_000_000),
            Err(SignatureRejection::DigestMismatch)
        );
    }

    #[test]
    fn tampered_body_is_a_digest_mismatch() {
        let header = sign("whsec_test", 1_700_000_000, b"{\"amount\":100}");
        assert_eq!(
            verify_signature("whsec_test", &header, b"{\"amount\":999}", 300, 1_700_000_000),
            Err(SignatureRejection::DigestMismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let body = b"{}";
        let header = sign("whsec_test", 1_700_000_000, body);
        assert_eq!(
            verify_signature("whsec_test", &header, body, 300, 1_700_000_500),
            Err(SignatureRejection::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn header_without_digest_or_timestamp_is_malformed() {
        assert_eq!(
            verify_signature("whsec_test", "t=123", b"{}", 300, 123),
            Err(SignatureRejection::MalformedHeader)
        );
        assert_eq!(
            verify_signature("whsec_test", "v1=zz", b"{}", 300, 123),
            Err(SignatureRejection::MalformedHeader)
        );
    }

    #[test]
    fn recognized_events_map_to_backend_actions() {
        let completed = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "amount_total": 250000 } }
        });
        let request = action_for_event(&completed).expect("mapped");
        assert_eq!(request.action, "postStripeCheckout");
        assert_eq!(request.params["session"]["id"], "cs_1");

        let succeeded = json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1" } }
        });
        let request = action_for_event(&succeeded).expect("mapped");
        assert_eq!(request.action, "postPayment");
        assert_eq!(request.params["payment_intent"]["id"], "pi_1");
    }

    #[test]
    fn unrecognized_event_types_map_to_nothing() {
        let event = json!({"type": "customer.created", "data": {"object": {}}});
        assert!(action_for_event(&event).is_none());
    }
}
