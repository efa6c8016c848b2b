//! The set of live streaming connections.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use parking_lot::RwLock;
use votehub_core::ConnectionId;

use super::connection::ClientConnection;
use crate::metrics::WS_CONNECTIONS_ACTIVE;

/// Connections indexed by id, behind a single lock.
///
/// The map is never handed out; callers iterate a [`snapshot`](Self::snapshot).
/// The active-connections gauge is written under the same write lock as the
/// map, so it always ends on the latest membership.
#[derive(Default)]
pub struct ClientRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ClientRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, replacing any entry with the same id.
    ///
    /// Returns the membership count after the insert.
    pub fn register(&self, connection: Arc<ClientConnection>) -> usize {
        let mut conns = self.connections.write();
        let _ = conns.insert(connection.id().clone(), connection);
        record_active(conns.len())
    }

    /// Remove a connection. Absent ids are a no-op.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let mut conns = self.connections.write();
        let removed = conns.remove(id);
        if removed.is_some() {
            let _ = record_active(conns.len());
        }
        removed
    }

    /// Point-in-time copy of the membership.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Remove every connection and return them.
    pub fn drain(&self) -> Vec<Arc<ClientConnection>> {
        let mut conns = self.connections.write();
        let drained = conns.drain().map(|(_, c)| c).collect();
        let _ = record_active(0);
        drained
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(len: usize) -> usize {
    gauge!(WS_CONNECTIONS_ACTIVE).set(len as f64);
    len
}
