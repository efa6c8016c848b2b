//! Server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Why a frame could not be queued for a connection.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection is not in the `Open` state.
    #[error("connection is not open")]
    NotOpen,
    /// The outbound queue is full; the client is not keeping up.
    #[error("outbound queue full")]
    QueueFull,
    /// The writer task has exited.
    #[error("outbound channel closed")]
    ChannelClosed,
}

/// Ingestion endpoint failures, rendered as JSON error bodies.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request body did not parse as JSON.
    #[error("Invalid JSON")]
    InvalidJson(#[source] serde_json::Error),
}

impl IngestError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidJson(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "error": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

/// Listener failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other socket I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
