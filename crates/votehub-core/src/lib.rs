//! # votehub-core
//!
//! Types shared by every votehub crate:
//!
//! - [`vote`]: the `Vote` event and its wire shape
//! - [`frame`]: WebSocket payload frames and the keepalive sentinel
//! - [`ids`]: prefixed identifier newtypes

#![deny(unsafe_code)]

pub mod frame;
pub mod ids;
pub mod vote;

pub use frame::{Frame, KEEPALIVE_SENTINEL};
pub use ids::{ConnectionId, VoteId};
pub use vote::{Category, Vote};
