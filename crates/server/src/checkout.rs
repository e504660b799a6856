use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::require_bearer;
use crate::error::ApiError;
use crate::payments::{CheckoutLine, CheckoutSessionRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(rename = "lineItems")]
    pub line_items: Vec<LineItemRequest>,
    pub mode: String,
    #[serde(rename = "successUrl")]
    pub success_url: String,
    #[serde(rename = "cancelUrl")]
    pub cancel_url: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// Caller-supplied line item: `price` wins when present, otherwise an inline
/// amount is required.
#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    pub price: Option<String>,
    pub quantity: Option<u32>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

fn to_checkout_line(item: &LineItemRequest) -> Result<CheckoutLine, ApiError> {
    let quantity = item.quantity.unwrap_or(1);
    if let Some(price) = &item.price {
        return Ok(CheckoutLine::PriceRef { price: price.clone(), quantity });
    }
    let amount_cents = item
        .amount
        .ok_or_else(|| ApiError::bad_request("Line item needs a price reference or an amount"))?;
    Ok(CheckoutLine::Inline {
        amount_cents,
        currency: item.currency.clone().unwrap_or_else(|| "usd".to_string()),
        name: item.name.clone().unwrap_or_else(|| "Program item".to_string()),
        quantity,
    })
}

/// `POST /api/agent/stripe/checkout` — build a provider checkout session from
/// the caller's line items and hand back the redirect URL.
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    require_bearer(&headers)?;
    let Json(body) = body?;

    if body.line_items.is_empty() {
        return Err(ApiError::bad_request("lineItems must not be empty"));
    }
    let lines =
        body.line_items.iter().map(to_checkout_line).collect::<Result<Vec<_>, ApiError>>()?;

    let session = state
        .payments
        .create_checkout_session(&CheckoutSessionRequest {
            mode: body.mode,
            success_url: body.success_url,
            cancel_url: body.cancel_url,
            lines,
            metadata: body.meta,
        })
        .await?;

    Ok(Json(CheckoutResponse { url: session.url, session_id: session.id }))
}
