//! Fan-out of one payload to every registered connection.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, warn};
use votehub_core::{ConnectionId, Frame};

use super::connection::ClientConnection;
use super::registry::ClientRegistry;
use crate::metrics::{
    HUB_BROADCASTS_TOTAL, HUB_DELIVERIES_TOTAL, HUB_KEEPALIVES_FILTERED_TOTAL,
    HUB_SEND_FAILURES_TOTAL,
};

/// Extension points of the connection lifecycle.
///
/// The session calls these and nothing else; the hub is the production
/// implementation.
pub trait LifecycleHooks: Send + Sync + 'static {
    /// The upgrade completed. Returns `false` if the connection could not be
    /// opened (it was closed first).
    fn on_open(&self, connection: &Arc<ClientConnection>) -> bool;
    /// A data frame arrived from `connection`.
    fn on_frame(&self, connection: &Arc<ClientConnection>, frame: Frame);
    /// The connection reached `Closed`. Called once per connection.
    fn on_close(&self, connection: &Arc<ClientConnection>);
}

/// Outcome of one [`BroadcastHub::broadcast`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot.
    pub recipients: usize,
    /// Frames queued successfully.
    pub delivered: usize,
    /// Origin or not-open connections passed over.
    pub skipped: usize,
    /// Sends that failed; those connections were dropped.
    pub failed: usize,
    /// The frame was a keepalive and went nowhere.
    pub filtered: bool,
}

/// Central coordinator between the registry and inbound payloads.
#[derive(Default)]
pub struct BroadcastHub {
    registry: ClientRegistry,
}

impl BroadcastHub {
    /// Hub with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying registry.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Open and register a connection.
    pub fn attach(&self, connection: &Arc<ClientConnection>) -> bool {
        if !connection.open() {
            return false;
        }
        let active = self.registry.register(connection.clone());
        debug!(conn_id = %connection.id(), active, "connection attached");
        true
    }

    /// Unregister and close a connection. Safe to call repeatedly.
    ///
    /// Returns `true` if the connection was still registered.
    pub fn detach(&self, connection: &ClientConnection) -> bool {
        let removed = self.registry.unregister(connection.id()).is_some();
        let _ = connection.close();
        removed
    }

    /// Deliver `frame` to every registered connection except `origin`.
    ///
    /// Keepalive frames are dropped here. A connection whose send fails is
    /// removed from the registry before this returns.
    pub fn broadcast(&self, frame: &Frame, origin: Option<&ConnectionId>) -> BroadcastReport {
        if frame.is_keepalive() {
            counter!(HUB_KEEPALIVES_FILTERED_TOTAL).increment(1);
            debug!(origin = ?origin.map(ConnectionId::as_str), "keepalive filtered");
            return BroadcastReport {
                filtered: true,
                ..BroadcastReport::default()
            };
        }

        let snapshot = self.registry.snapshot();
        let mut report = BroadcastReport {
            recipients: snapshot.len(),
            ..BroadcastReport::default()
        };
        counter!(HUB_BROADCASTS_TOTAL).increment(1);

        for conn in &snapshot {
            if origin == Some(conn.id()) || !conn.is_open() {
                report.skipped += 1;
                continue;
            }
            match conn.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    report.failed += 1;
                    warn!(conn_id = %conn.id(), %error, "send failed, dropping client");
                    let _ = self.detach(conn);
                }
            }
        }

        counter!(HUB_DELIVERIES_TOTAL).increment(report.delivered as u64);
        if report.failed > 0 {
            counter!(HUB_SEND_FAILURES_TOTAL).increment(report.failed as u64);
        }
        debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            bytes = frame.len(),
            "broadcast"
        );
        report
    }

    /// Serialize `payload` and deliver it to every connection.
    pub fn publish_json(&self, payload: &Value) -> BroadcastReport {
        match Frame::json(payload) {
            Ok(frame) => self.broadcast(&frame, None),
            Err(error) => {
                warn!(%error, "failed to serialize payload");
                BroadcastReport::default()
            }
        }
    }

    /// Close and unregister every connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained = self.registry.drain();
        for conn in &drained {
            let _ = conn.close();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all connections");
        }
        drained.len()
    }
}

impl LifecycleHooks for BroadcastHub {
    fn on_open(&self, connection: &Arc<ClientConnection>) -> bool {
        self.attach(connection)
    }

    fn on_frame(&self, connection: &Arc<ClientConnection>, frame: Frame) {
        let report = self.broadcast(&frame, Some(connection.id()));
        if !report.filtered {
            debug!(
                conn_id = %connection.id(),
                delivered = report.delivered,
                "relayed client frame"
            );
        }
    }

    fn on_close(&self, connection: &Arc<ClientConnection>) {
        let _ = self.detach(connection);
    }
}
