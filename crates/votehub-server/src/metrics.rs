//! Metric names and the `/metrics` endpoint handler.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::server::AppState;

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Registered WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Broadcast calls that reached the fan-out loop (counter).
pub const HUB_BROADCASTS_TOTAL: &str = "hub_broadcasts_total";
/// Frames queued to recipients (counter).
pub const HUB_DELIVERIES_TOTAL: &str = "hub_deliveries_total";
/// Per-connection send failures (counter).
pub const HUB_SEND_FAILURES_TOTAL: &str = "hub_send_failures_total";
/// Keepalive frames dropped at the hub (counter).
pub const HUB_KEEPALIVES_FILTERED_TOTAL: &str = "hub_keepalives_filtered_total";
/// Ingestion requests received (counter).
pub const INGEST_REQUESTS_TOTAL: &str = "ingest_requests_total";
/// Ingestion requests rejected as malformed (counter).
pub const INGEST_REJECTIONS_TOTAL: &str = "ingest_rejections_total";

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
