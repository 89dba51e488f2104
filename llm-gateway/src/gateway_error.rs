//! # Gateway Error Types
//!
//! The error taxonomy the routing pipeline reports to clients, independent
//! of transport. Every variant maps to exactly one HTTP status code and the
//! same `{"error": {"message", "type", "code"}}` JSON envelope.
//!
//! ## Propagation policy
//!
//! Authentication, authorization, budget, and routing failures are resolved
//! entirely inside the routing pipeline before any upstream I/O — they never
//! reach an adapter. Upstream failures on a unary call surface as
//! [`GatewayError::UpstreamError`]; upstream failures mid-stream instead emit
//! one in-band `{"error": {...}}` SSE chunk followed by `[DONE]`, since
//! headers are already on the wire by then (see `routing_pipeline.rs`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use gateway_core::ProviderError;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// No credential presented, or the credential doesn't resolve to a caller.
    #[error("unauthenticated: {message}")]
    Unauthenticated { message: String },

    /// Credential is valid but `request.model` is outside `allowed_models`.
    #[error("forbidden: model {model} is not in this caller's allowed models")]
    Forbidden { model: String },

    /// `budget_used >= budget_limit` at the pre-request check.
    #[error("budget exceeded")]
    BudgetExceeded,

    /// No active channel maps the requested model.
    #[error("no upstream channel supports model {model}")]
    NoUpstream { model: String },

    /// Upstream returned non-2xx, timed out, or emitted malformed data.
    #[error("upstream error: {0}")]
    UpstreamError(#[from] ProviderError),

    /// Request body failed schema validation.
    #[error("validation error: {message}")]
    ValidationError { message: String },

    /// Bootstrap or wiring failure that isn't any of the above.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Unauthenticated { .. } => "unauthenticated",
            GatewayError::Forbidden { .. } => "forbidden",
            GatewayError::BudgetExceeded => "budget_exceeded",
            GatewayError::NoUpstream { .. } => "no_upstream",
            GatewayError::UpstreamError(_) => "upstream_error",
            GatewayError::ValidationError { .. } => "validation_error",
            GatewayError::Internal { .. } => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden { .. } => StatusCode::FORBIDDEN,
            GatewayError::BudgetExceeded => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoUpstream { .. } => StatusCode::NOT_FOUND,
            GatewayError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The in-band SSE error chunk emitted mid-stream, per spec §7's
    /// propagation policy — headers are already sent, so this can't become
    /// an HTTP status.
    pub fn to_sse_chunk(&self) -> String {
        json!({"error": {"message": self.to_string()}}).to_string()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_type = self.error_type();
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16(),
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_map_to_documented_status_codes() {
        assert_eq!(
            GatewayError::Unauthenticated { message: "no token".into() }.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::Forbidden { model: "gpt-4".into() }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(GatewayError::BudgetExceeded.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            GatewayError::NoUpstream { model: "gpt-4".into() }.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::UpstreamError(ProviderError::InvalidApiKey).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::ValidationError { message: "bad body".into() }.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn sse_chunk_carries_message_under_error_key() {
        let err = GatewayError::UpstreamError(ProviderError::ServiceUnavailable);
        let chunk = err.to_sse_chunk();
        let parsed: serde_json::Value = serde_json::from_str(&chunk).unwrap();
        assert!(parsed["error"]["message"].is_string());
    }
}
