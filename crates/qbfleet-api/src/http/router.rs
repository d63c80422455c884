//! Router construction and server host for the API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, Method, Request, header::CONTENT_TYPE},
    routing::{get, patch, post, put},
};
use qbfleet_core::Core;
use qbfleet_events::EventBus;
use qbfleet_telemetry::Metrics;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::constants::HEADER_LAST_EVENT_ID;
use crate::http::health::{liveness, metrics, readiness};
use crate::http::instances::{
    get_capabilities, get_preferences, get_speed_limits, get_stats, list_instances,
    patch_preferences, put_speed_limits, toggle_speed_limits,
};
use crate::http::logs::{main_logs, peer_logs};
use crate::http::sse::{stream_logs, stream_rss, stream_torrents};
use crate::http::telemetry::HttpMetricsLayer;
use crate::http::torrents::{bulk_action, instance_action, list_torrents};
use crate::state::AppState;

/// Axum router wrapper that hosts the fleet proxy's HTTP API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Construct a new API server with shared dependencies wired through
    /// application state.
    pub fn new(core: Arc<Core>, events: EventBus, telemetry: Metrics) -> Self {
        let state = AppState::new(core, telemetry.clone(), events);
        state.spawn_degradation_reconciler();

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT])
            .allow_headers([CONTENT_TYPE, HeaderName::from_static(HEADER_LAST_EVENT_ID)]);

        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );

        let layered = ServiceBuilder::new()
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Self::build_router()
            .layer(cors_layer)
            .route_layer(layered)
            .with_state(state);

        Self { router }
    }

    fn build_router() -> Router<AppState> {
        Self::public_routes().merge(Self::instance_routes()).merge(Self::torrent_routes())
    }

    fn public_routes() -> Router<AppState> {
        Router::new()
            .route("/health", get(liveness))
            .route("/health/full", get(readiness))
            .route("/metrics", get(metrics))
    }

    fn instance_routes() -> Router<AppState> {
        Router::new()
            .route("/api/instances", get(list_instances))
            .route("/api/instances/{id}/stats", get(get_stats))
            .route("/api/instances/{id}/preferences", get(get_preferences).patch(patch_preferences))
            .route(
                "/api/instances/{id}/speed-limits",
                get(get_speed_limits).put(put_speed_limits),
            )
            .route("/api/instances/{id}/speed-limits/toggle", post(toggle_speed_limits))
            .route("/api/instances/{id}/capabilities", get(get_capabilities))
            .route("/api/instances/{id}/logs/main", get(main_logs))
            .route("/api/instances/{id}/logs/peers", get(peer_logs))
            .route("/api/instances/{id}/sse/torrents", get(stream_torrents))
            .route("/api/instances/{id}/sse/rss", get(stream_rss))
            .route("/api/instances/{id}/sse/logs", get(stream_logs))
    }

    fn torrent_routes() -> Router<AppState> {
        Router::new()
            .route("/api/instances/{id}/torrents", get(list_torrents))
            .route("/api/instances/{id}/torrents/action", post(instance_action))
            .route("/api/torrents/bulk-action", post(bulk_action))
    }

    /// Serve the API using the configured router on the supplied address.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError::Bind` if the listener fails to bind, or
    /// `ApiServerError::Serve` if the accept loop terminates unexpectedly.
    pub async fn serve(self, addr: SocketAddr) -> ApiServerResult<()> {
        tracing::info!(%addr, "starting API");
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        axum::serve(listener, self.router.into_make_service())
            .await
            .map_err(|source| ApiServerError::Serve { source })?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) const fn router(&self) -> &Router {
        &self.router
    }
}
