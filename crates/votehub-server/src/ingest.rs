//! `POST /api/broadcast`: accept one JSON payload and fan it out.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use metrics::counter;
use serde_json::{json, Value};
use tracing::{info, warn};
use votehub_core::Vote;

use crate::errors::IngestError;
use crate::metrics::{INGEST_REJECTIONS_TOTAL, INGEST_REQUESTS_TOTAL};
use crate::server::AppState;

/// Parse the body as any JSON value, broadcast it to every connection and
/// echo it back.
///
/// Responds only after the fan-out; the fan-out never waits on a socket.
pub async fn broadcast_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, IngestError> {
    counter!(INGEST_REQUESTS_TOTAL).increment(1);

    let payload: Value = serde_json::from_slice(&body).map_err(|error| {
        counter!(INGEST_REJECTIONS_TOTAL).increment(1);
        warn!(%error, bytes = body.len(), "rejected ingest payload");
        IngestError::InvalidJson(error)
    })?;

    let report = state.hub.publish_json(&payload);

    if let Some(vote) = Vote::from_payload(&payload) {
        info!(
            subject = %vote.masked_subject(),
            category = %vote.category,
            delivered = report.delivered,
            failed = report.failed,
            "vote broadcast"
        );
    } else {
        info!(
            delivered = report.delivered,
            failed = report.failed,
            "payload broadcast"
        );
    }

    Ok(Json(json!({ "status": "ok", "sent": payload })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::hub::ClientConnection;
    use crate::server::HubServer;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn post(server: &HubServer, body: &'static str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/api/broadcast")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn valid_payload_is_echoed_and_delivered() {
        let server = HubServer::new(ServerConfig::default(), None);
        let (conn, mut rx) = ClientConnection::channel(4);
        assert!(server.hub().attach(&conn));

        let (status, body) = post(&server, r#"{"subjectId":"+15551234567","category":3}"#).await;

        let expected = json!({"subjectId": "+15551234567", "category": 3});
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "sent": expected}));

        let frame = rx.try_recv().unwrap();
        let delivered: Value = serde_json::from_slice(frame.as_bytes()).unwrap();
        assert_eq!(delivered, expected);
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_without_broadcast() {
        let server = HubServer::new(ServerConfig::default(), None);
        let (conn, mut rx) = ClientConnection::channel(4);
        assert!(server.hub().attach(&conn));

        let (status, body) = post(&server, "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"status": "error", "error": "Invalid JSON"}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let server = HubServer::new(ServerConfig::default(), None);
        let (status, _) = post(&server, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_object_json_is_accepted() {
        let server = HubServer::new(ServerConfig::default(), None);
        let (status, body) = post(&server, "[1,2,3]").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sent"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn broken_client_does_not_fail_request() {
        let server = HubServer::new(ServerConfig::default(), None);
        let (broken, broken_rx) = ClientConnection::channel(4);
        let (healthy, mut healthy_rx) = ClientConnection::channel(4);
        assert!(server.hub().attach(&broken));
        assert!(server.hub().attach(&healthy));
        drop(broken_rx);

        let (status, _) = post(&server, r#"{"category":1}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert!(healthy_rx.try_recv().is_ok());
        assert!(!server.hub().registry().contains(broken.id()));
        assert_eq!(server.hub().connection_count(), 1);
    }

    #[tokio::test]
    async fn keepalive_payload_is_acknowledged_but_not_delivered() {
        let server = HubServer::new(ServerConfig::default(), None);
        let (conn, mut rx) = ClientConnection::channel(4);
        assert!(server.hub().attach(&conn));

        let (status, _) = post(&server, r#"{"event":"ping"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }
}
