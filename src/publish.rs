//! HTTP publisher used by the `send` and `simulate` commands.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use rand::Rng;
use serde_json::Value;
use tracing::debug;
use votehub_core::Vote;

/// Posts votes to a hub's ingestion endpoint.
pub struct Publisher {
    client: reqwest::Client,
    endpoint: String,
}

impl Publisher {
    /// Publisher for the hub at `base_url` (e.g. `http://127.0.0.1:3000`).
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/broadcast", base_url.trim_end_matches('/')),
        }
    }

    /// Full ingestion URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST one vote and return the hub's acknowledgment body.
    pub async fn publish(&self, vote: &Vote) -> Result<Value> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(vote)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.endpoint))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .context("Hub returned a non-JSON response")?;
        if !status.is_success() {
            bail!("hub rejected vote ({status}): {body}");
        }
        debug!(subject = %vote.masked_subject(), category = %vote.category, "vote published");
        Ok(body)
    }
}

/// Publish `count` sampled votes, pausing `interval` between them.
///
/// Returns how many were acknowledged.
pub async fn simulate<R: Rng + ?Sized>(
    publisher: &Publisher,
    rng: &mut R,
    count: usize,
    interval: Duration,
    tables: &[u32],
) -> Result<usize> {
    let mut sent = 0;
    for i in 0..count {
        if i > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        let vote = Vote::sample(rng, tables).context("at least one table is required")?;
        let _ = publisher.publish(&vote).await?;
        println!("table {:>3}  {}", vote.category, vote.masked_subject());
        sent += 1;
    }
    Ok(sent)
}
