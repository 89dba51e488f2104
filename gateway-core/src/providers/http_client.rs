//! Shared HTTP error mapping for upstream adapters.
//!
//! Each adapter builds its own request (base url, auth header, and body
//! shape all vary per provider kind and per channel), but they share one
//! way of turning a non-2xx [`reqwest::Response`] into a [`ProviderError`].

use crate::error::ProviderError;
use reqwest::Response;

pub async fn map_error_response(resp: Response) -> ProviderError {
    let status = resp.status();
    match resp.text().await {
        Ok(body) => {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").cloned())
                .and_then(|e| {
                    e.get("message")
                        .cloned()
                        .or_else(|| e.as_str().map(|s| serde_json::Value::String(s.to_string())))
                })
                .and_then(|m| m.as_str().map(|s| s.to_string()))
                .unwrap_or_else(|| body.clone());

            match status.as_u16() {
                401 => ProviderError::InvalidApiKey,
                404 => ProviderError::ModelNotFound { model: "unknown".to_string() },
                429 => ProviderError::RateLimit,
                503 => ProviderError::ServiceUnavailable,
                code => ProviderError::Api { code, message },
            }
        }
        Err(_) => ProviderError::Api {
            code: status.as_u16(),
            message: "failed to read error response body".to_string(),
        },
    }
}
