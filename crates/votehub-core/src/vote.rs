//! The vote event.
//!
//! The hub itself relays payloads as opaque JSON; this typed view exists for
//! producers (the `send`/`simulate` CLI) and for log lines, where the
//! subject is always masked.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::VoteId;

/// Destination bucket of a vote (e.g. a table number).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Category {
    /// Numeric bucket, e.g. table `3`.
    Number(u32),
    /// Free-form label.
    Label(String),
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Label(s) => f.write_str(s),
        }
    }
}

impl From<u32> for Category {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        Self::Label(s.to_owned())
    }
}

/// A single vote notification.
///
/// Field names on the wire are camelCase. The names used by the legacy
/// viewer page (`phoneNumber`, `tableNumber`, `timestamp`) are accepted on
/// input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Producer-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<VoteId>,
    /// Who voted, typically a phone number.
    #[serde(alias = "phoneNumber")]
    pub subject_id: String,
    /// Where the vote goes, typically a table number.
    #[serde(alias = "tableNumber")]
    pub category: Category,
    /// When the producer created the vote. Display only.
    #[serde(default, alias = "timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Vote {
    /// Create a vote stamped with a fresh id and the current time.
    pub fn new(subject_id: impl Into<String>, category: impl Into<Category>) -> Self {
        Self {
            id: Some(VoteId::new()),
            subject_id: subject_id.into(),
            category: category.into(),
            created_at: Some(Utc::now()),
        }
    }

    /// Random vote from a `+1` phone number for one of `tables`.
    ///
    /// Returns `None` when `tables` is empty.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, tables: &[u32]) -> Option<Self> {
        if tables.is_empty() {
            return None;
        }
        let table = tables[rng.random_range(0..tables.len())];
        let phone = format!("+1{}", rng.random_range(1_000_000_000_u64..10_000_000_000));
        Some(Self::new(phone, table))
    }

    /// Subject with everything but the last four characters replaced by `*`.
    pub fn masked_subject(&self) -> String {
        mask_subject(&self.subject_id)
    }

    /// Best-effort typed view of an arbitrary payload.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        Self::deserialize(payload).ok()
    }

    /// Serialize to a JSON value for publishing.
    pub fn to_payload(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Mask all but the last four characters. Short inputs are returned as-is.
pub fn mask_subject(subject: &str) -> String {
    let len = subject.chars().count();
    if len < 4 {
        return subject.to_owned();
    }
    let visible: String = subject.chars().skip(len - 4).collect();
    format!("{}{visible}", "*".repeat(len - 4))
}
