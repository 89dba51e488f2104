//! The metrics store: an append-only [`RequestOutcome`] log with a narrow
//! read side. All percentile/success-rate analysis lives in
//! [`crate::load_balancer`] — this module only retains and retrieves.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::outcome::RequestOutcome;

#[derive(Debug, Error)]
pub enum MetricsStoreError {
    #[error("metrics store unavailable: {message}")]
    Unavailable { message: String },
}

/// Append/read interface over the outcome log. Implementations may back
/// this with a file, a database, or (as here) an in-process table; the core
/// never assumes relational persistence.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Record one outcome. Must never fail silently — callers are expected
    /// to log a returned error and continue serving, not to crash the
    /// request that produced it.
    async fn append(&self, outcome: RequestOutcome) -> Result<(), MetricsStoreError>;

    /// Outcomes for `(channel_id, model)` with `timestamp >= since`, in an
    /// implementer-chosen order.
    async fn query(
        &self,
        channel_id: &str,
        model: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RequestOutcome>, MetricsStoreError>;
}

/// Process-local outcome log keyed by `(channel_id, model)`. Adequate for a
/// single gateway instance; a shared deployment would swap this for a
/// database-backed `MetricsStore` without touching the load balancer.
#[derive(Default)]
pub struct InMemoryMetricsStore {
    by_channel_model: DashMap<(String, String), Vec<RequestOutcome>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn append(&self, outcome: RequestOutcome) -> Result<(), MetricsStoreError> {
        let key = (outcome.channel_id.clone(), outcome.model.clone());
        self.by_channel_model.entry(key).or_default().push(outcome);
        Ok(())
    }

    async fn query(
        &self,
        channel_id: &str,
        model: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RequestOutcome>, MetricsStoreError> {
        let key = (channel_id.to_string(), model.to_string());
        let result = self
            .by_channel_model
            .get(&key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|o| o.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::OutcomeStatus;
    use chrono::Duration;

    fn outcome(channel: &str, model: &str, ts: DateTime<Utc>) -> RequestOutcome {
        RequestOutcome {
            request_id: "r".into(),
            caller_id: "c".into(),
            owner_id: "o".into(),
            channel_id: channel.into(),
            model: model.into(),
            status: OutcomeStatus::Success,
            tokens_in: 10,
            tokens_out: 10,
            cost: 0.01,
            latency_ms: 100,
            error_message: None,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn query_filters_by_since_and_key() {
        let store = InMemoryMetricsStore::new();
        let now = Utc::now();
        store.append(outcome("ch1", "gpt-4", now - Duration::minutes(60))).await.unwrap();
        store.append(outcome("ch1", "gpt-4", now - Duration::minutes(5))).await.unwrap();
        store.append(outcome("ch2", "gpt-4", now)).await.unwrap();

        let results = store
            .query("ch1", "gpt-4", now - Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn query_on_empty_window_is_empty_not_error() {
        let store = InMemoryMetricsStore::new();
        let results = store.query("missing", "model", Utc::now()).await.unwrap();
        assert!(results.is_empty());
    }
}
