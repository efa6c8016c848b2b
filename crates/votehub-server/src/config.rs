//! Server configuration.

use std::time::Duration;

use votehub_settings::HubSettings;

use crate::hub::SessionOptions;

/// Configuration for the hub server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-session keepalive, write deadline and queue size.
    pub session: SessionOptions,
    /// How long shutdown waits for the listener to drain.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 1024 * 1024,
            session: SessionOptions::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&HubSettings> for ServerConfig {
    fn from(settings: &HubSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            session: SessionOptions {
                keepalive_interval: settings.hub.keepalive_interval(),
                send_timeout: settings.hub.send_timeout(),
                queue_capacity: settings.hub.send_queue_capacity,
            },
            shutdown_timeout: Duration::from_millis(settings.server.shutdown_timeout_ms),
        }
    }
}

impl ServerConfig {
    /// `host:port` as given.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
