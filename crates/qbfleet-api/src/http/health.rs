//! Liveness, readiness, and Prometheus exposition endpoints.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::state::AppState;

/// `GET /health` — cheap liveness probe, always `200 ok` once the process
/// is serving requests.
pub(crate) async fn liveness() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadinessBody {
    status: &'static str,
    degraded: Vec<String>,
    client_pool_size: usize,
}

/// `GET /health/full` — readiness probe including the degraded-component
/// list; reports `503` while any component is degraded.
pub(crate) async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let degraded = state.degraded_components();
    let status = if degraded.is_empty() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = ReadinessBody {
        status: if degraded.is_empty() { "ok" } else { "degraded" },
        degraded,
        client_pool_size: state.core.client_pool.size(),
    };
    (status, Json(body))
}

/// `GET /metrics` — Prometheus text exposition format.
pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.telemetry.render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to render metrics: {err}")).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_reports_ok() {
        assert_eq!(liveness().await, "ok");
    }
}
