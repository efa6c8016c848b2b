//! Per-connection keepalive emitter.
//!
//! Idle-timeout proxies drop quiet WebSocket connections, so every open
//! connection gets the keepalive sentinel on a fixed interval. The sentinel
//! is queued on that connection only; it never passes through the hub.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use votehub_core::Frame;

use super::connection::ClientConnection;
use crate::errors::SendError;

/// Why the keepalive loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepaliveOutcome {
    /// The connection closed.
    Stopped,
    /// Queuing the sentinel failed; the caller should close the connection.
    SendFailed(SendError),
}

/// Send [`Frame::keepalive`] every `interval` until the connection closes.
///
/// The first sentinel goes out one full interval after start.
pub async fn run_keepalive(connection: Arc<ClientConnection>, interval: Duration) -> KeepaliveOutcome {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = connection.closed() => return KeepaliveOutcome::Stopped,
            _ = ticker.tick() => {
                if let Err(error) = connection.send(Frame::keepalive()) {
                    if error == SendError::NotOpen {
                        return KeepaliveOutcome::Stopped;
                    }
                    return KeepaliveOutcome::SendFailed(error);
                }
            }
        }
    }
}
