//! [`RequestOutcome`] — the single append-only fact every request produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Record of one completed (or failed) request, appended exactly once.
///
/// `channel_id` is always the channel actually invoked, even on failure.
/// `model` is always the public model id, never the upstream-native one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub request_id: String,
    pub caller_id: String,
    pub owner_id: String,
    pub channel_id: String,
    pub model: String,
    pub status: OutcomeStatus,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost: f64,
    pub latency_ms: u64,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}
