//! Settings schema.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Network listener settings.
    pub server: ServerSettings,
    /// Fan-out and keepalive tuning.
    pub hub: HubTuning,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl HubSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.hub.keepalive_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.keepaliveIntervalMs must be > 0".into(),
            ));
        }
        if self.hub.send_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.sendTimeoutMs must be > 0".into(),
            ));
        }
        if self.hub.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.sendQueueCapacity must be > 0".into(),
            ));
        }
        if self.server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be > 0".into(),
            ));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(SettingsError::InvalidValue(format!(
                "logging.level '{}' is not a log level",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Network listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for the listener to drain.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_message_size: 1024 * 1024,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Fan-out and keepalive tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubTuning {
    /// Interval between keepalive sentinels on each connection.
    pub keepalive_interval_ms: u64,
    /// Deadline for a single socket write.
    pub send_timeout_ms: u64,
    /// Outbound frames buffered per connection before sends fail.
    pub send_queue_capacity: usize,
}

impl Default for HubTuning {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: 29_000,
            send_timeout_ms: 5_000,
            send_queue_capacity: 256,
        }
    }
}

impl HubTuning {
    /// Keepalive interval as a `Duration`.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Socket write deadline as a `Duration`.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
