//! Payload frames exchanged with streaming clients.

use std::borrow::Cow;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

/// The keepalive no-op payload. Sent by clients and by the server's
/// keepalive monitor; never relayed to other clients.
pub const KEEPALIVE_SENTINEL: &str = r#"{"event":"ping"}"#;

/// One application payload, as received from or sent to a client.
///
/// Cloning is cheap; a single frame is shared by every recipient of a
/// fan-out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(Arc<str>),
    /// Binary frame, relayed byte-for-byte.
    Binary(Bytes),
}

impl Frame {
    /// A text frame.
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::Text(text.into())
    }

    /// The keepalive sentinel as a text frame.
    pub fn keepalive() -> Self {
        Self::text(KEEPALIVE_SENTINEL)
    }

    /// Serialize a JSON value into a text frame.
    pub fn json(value: &Value) -> serde_json::Result<Self> {
        serde_json::to_string(value).map(Self::text)
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(t) => t.as_bytes(),
            Self::Binary(b) => b.as_ref(),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Whether this frame is the keepalive sentinel.
    ///
    /// Matching is structural: any JSON encoding equal to
    /// `{"event":"ping"}` counts, regardless of whitespace, escapes, length
    /// or frame type.
    pub fn is_keepalive(&self) -> bool {
        let bytes = self.as_bytes();
        if bytes == KEEPALIVE_SENTINEL.as_bytes() {
            return true;
        }
        let trimmed = bytes.trim_ascii();
        if !(trimmed.starts_with(b"{") && trimmed.ends_with(b"}")) {
            return false;
        }
        // Any key other than `event` fails on sight, so large payloads bail early.
        matches!(
            serde_json::from_slice::<SentinelShape<'_>>(trimmed),
            Ok(shape) if shape.event == "ping"
        )
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SentinelShape<'a> {
    #[serde(borrow)]
    event: Cow<'a, str>,
}
