use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;
use crate::{agent_api, checkout, connect, files, health, webhook};

/// Shared cross-origin policy for every route, preflight included: the admin
/// dashboard calls this service from another origin, and the provider sends
/// its signature header.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("stripe-signature"),
        ])
}

/// The dispatch table: one handler per (method, path), unified only by CORS
/// and the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/agent", post(agent_api::handle))
        .route("/api/agent/stripe/checkout", post(checkout::handle))
        .route("/webhooks/stripe", post(webhook::handle))
        .route("/files/upload", post(files::upload))
        .route("/files/download", get(files::download))
        .route("/connect/create-account", post(connect::create_account))
        .route("/connect/onboard-link", post(connect::onboard_link))
        .route("/connect/payout", post(connect::payout))
        .layer(cors_layer())
        .with_state(state)
}
