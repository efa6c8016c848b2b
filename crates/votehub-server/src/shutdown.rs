//! Hub shutdown: stop accepting streaming clients, close the ones that are
//! connected, then wait for the listener to drain.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hub::BroadcastHub;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the server-wide cancellation token and the hub it shuts down.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    hub: Arc<BroadcastHub>,
}

impl ShutdownCoordinator {
    /// Coordinator for `hub`.
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self {
            token: CancellationToken::new(),
            hub,
        }
    }

    /// Token cancelled when shutdown begins. The listener's graceful-shutdown
    /// signal waits on it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Begin shutdown: cancel the token and close every registered
    /// connection. Repeat calls only re-close stragglers.
    pub fn shutdown(&self) {
        let first = !self.token.is_cancelled();
        self.token.cancel();
        let closed = self.hub.close_all();
        if first {
            info!(closed, "shutdown started");
        }
    }

    /// Whether shutdown has begun. New streaming clients are refused from
    /// this point on.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// [`shutdown`](Self::shutdown), then wait up to `timeout` for the
    /// listener tasks in `handles`.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();

        let drained = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;
        if drained.is_err() {
            warn!(
                timeout_ms = timeout.as_millis(),
                remaining = self.hub.connection_count(),
                "listener did not drain in time"
            );
            return false;
        }
        true
    }
}
