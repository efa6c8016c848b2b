//! # votehub-server
//!
//! Axum HTTP + `WebSocket` connection hub.
//!
//! - `POST /api/broadcast`: ingest one JSON payload and fan it out
//! - `GET /api/ws`: streaming clients; inbound frames are relayed to every
//!   other client, keepalive sentinels excepted
//! - Per-connection keepalive, bounded outbound queues and write deadlines
//! - Health, Prometheus metrics, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod hub;
pub mod ingest;
pub mod metrics;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use errors::{IngestError, SendError, ServerError};
pub use hub::{BroadcastHub, BroadcastReport, ClientConnection, ClientRegistry, LifecycleHooks};
pub use server::HubServer;
