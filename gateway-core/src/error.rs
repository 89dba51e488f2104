//! Error types for upstream provider interaction.
//!
//! Provider errors are the only error surface this crate exposes to callers.
//! The load balancer never propagates them: a failed upstream call is
//! recorded via [`crate::load_balancer::LoadBalancer::record`] and reflected
//! in that channel's health, never bubbled up as an `Err` from `select`.

use thiserror::Error;

/// Errors that occur while building, sending, or parsing an upstream
/// provider request.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Network/HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned a non-2xx status this adapter doesn't special-case.
    #[error("upstream api error: {code} - {message}")]
    Api { code: u16, message: String },

    /// 401 from upstream.
    #[error("invalid api key")]
    InvalidApiKey,

    /// 404 / unknown model from upstream.
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// 429 from upstream.
    #[error("rate limit exceeded")]
    RateLimit,

    /// Upstream reports quota exhaustion distinct from rate limiting.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// Upstream unreachable or returning 5xx.
    #[error("service unavailable")]
    ServiceUnavailable,

    /// Upstream call exceeded the configured deadline.
    #[error("timeout")]
    Timeout,

    /// Response body didn't parse as the expected shape.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response parsed as JSON but was missing fields this adapter needs.
    #[error("invalid response format: {message}")]
    InvalidResponse { message: String },

    /// Channel configuration (api_base, api_version, ...) is unusable.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}
