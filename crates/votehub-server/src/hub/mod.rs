//! Connection hub: registry, fan-out, keepalive and the per-client session.

pub mod broadcast;
pub mod connection;
pub mod keepalive;
pub mod registry;
pub mod session;

pub use broadcast::{BroadcastHub, BroadcastReport, LifecycleHooks};
pub use connection::{ClientConnection, ConnectionState};
pub use keepalive::{run_keepalive, KeepaliveOutcome};
pub use registry::ClientRegistry;
pub use session::{run_session, SessionOptions};
