use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use opsgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use opsgate_core::ActionRequest;

use crate::auth::require_bearer;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub email: String,
    pub affiliate_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    #[serde(rename = "accountId")]
    pub account_id: String,
}

/// `POST /connect/create-account` — create a provider sub-account for the
/// affiliate, then record the linkage through the forwarder.
pub async fn create_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<Json<CreateAccountResponse>, ApiError> {
    require_bearer(&headers)?;
    let Json(body) = body?;

    let account = state.payments.create_connect_account(&body.email).await?;

    state
        .backend
        .execute(&ActionRequest::new(
            "linkStripeAccount",
            json!({
                "affiliate_id": body.affiliate_id,
                "stripe_account_id": account.id,
            }),
        ))
        .await?;

    Ok(Json(CreateAccountResponse { account_id: account.id }))
}

#[derive(Debug, Deserialize)]
pub struct OnboardLinkRequest {
    #[serde(rename = "accountId")]
    pub account_id: String,
    pub refresh_url: String,
    pub return_url: String,
}

#[derive(Debug, Serialize)]
pub struct OnboardLinkResponse {
    pub url: String,
}

/// `POST /connect/onboard-link` — mint a provider onboarding link for an
/// existing sub-account.
pub async fn onboard_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<OnboardLinkRequest>, JsonRejection>,
) -> Result<Json<OnboardLinkResponse>, ApiError> {
    require_bearer(&headers)?;
    let Json(body) = body?;

    let link = state
        .payments
        .create_onboarding_link(&body.account_id, &body.refresh_url, &body.return_url)
        .await?;

    Ok(Json(OnboardLinkResponse { url: link.url }))
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub affiliate_id: String,
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct PayoutResponse {
    pub success: bool,
    pub transfer_id: String,
}

/// `POST /connect/payout` — look up the affiliate's linked provider account,
/// transfer the amount, and record the transfer. An affiliate with no linked
/// account is a caller error, not an upstream failure, and the provider's
/// transfer API is never reached.
pub async fn payout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PayoutRequest>, JsonRejection>,
) -> Result<Json<PayoutResponse>, ApiError> {
    require_bearer(&headers)?;
    let Json(body) = body?;
    let correlation_id = Uuid::new_v4().to_string();

    if body.amount_cents <= 0 {
        return Err(ApiError::bad_request("amount_cents must be positive"));
    }

    let account_payload = state
        .backend
        .execute(&ActionRequest::new(
            "getAffiliateAccount",
            json!({ "affiliate_id": body.affiliate_id }),
        ))
        .await?;

    let destination = account_payload
        .pointer("/data/stripe_account_id")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("Affiliate not onboarded to payout account"))?;

    let transfer = state
        .payments
        .create_transfer(body.amount_cents, &destination, "Affiliate commission payout")
        .await?;

    state
        .backend
        .execute(&ActionRequest::new(
            "recordTransfer",
            json!({
                "affiliate_id": body.affiliate_id,
                "amount": (body.amount_cents as f64) / 100.0,
                "stripe_account_id": destination,
                "stripe_transfer_id": transfer.id,
            }),
        ))
        .await?;

    state.audit.emit(
        AuditEvent::new(
            &correlation_id,
            "connect.payout_completed",
            AuditCategory::Payment,
            &body.affiliate_id,
            AuditOutcome::Success,
        )
        .with_metadata("transfer_id", &transfer.id)
        .with_metadata("amount_cents", body.amount_cents.to_string()),
    );

    Ok(Json(PayoutResponse { success: true, transfer_id: transfer.id }))
}
