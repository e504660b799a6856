use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub checked_at: String,
}

/// `GET /health` — readiness probe. The router holds no durable state, so
/// readiness is just "the process is serving".
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: "opsgate-server",
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::health;

    #[tokio::test]
    async fn health_reports_ready() {
        let (status, payload) = health().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.0.status, "ready");
        assert_eq!(payload.0.service, "opsgate-server");
    }
}
