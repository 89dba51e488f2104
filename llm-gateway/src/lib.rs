//! # LLM Gateway
//!
//! A multi-tenant reverse proxy that fronts several LLM provider APIs behind
//! one OpenAI-compatible surface. A caller authenticates with an opaque API
//! key, the routing pipeline picks an upstream channel via the configured
//! load-balancing strategy, and usage is metered per caller for budget
//! enforcement.
//!
//! ## Architecture
//!
//! - **`auth`**: caller authentication, API key generation/hashing
//! - **`channel_store`**: in-process channel and model-mapping table
//! - **`config`**: configuration loading and validation
//! - **`cost`**: per-request billing
//! - **`gateway_error`**: the HTTP-facing error taxonomy
//! - **`handlers`**: axum route handlers
//! - **`routing_pipeline`**: the per-request authenticate → select → invoke
//!   → record sequence
//! - **`server`**: router assembly and shared state
//!
//! Channel/caller administration, persistence beyond the in-process tables,
//! and credential storage are out of scope for this crate; it consumes
//! `gateway_core`'s `ChannelSource` and `MetricsStore` traits so a real
//! backing store can be swapped in without touching the routing pipeline.

pub mod auth;
pub mod channel_store;
pub mod config;
pub mod cost;
pub mod gateway_error;
pub mod handlers;
pub mod routing_pipeline;
pub mod server;

pub use server::{build_state, build_state_with_callers, create_server, router, AppState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::StatusCode;
    use axum_test::TestServer;

    #[tokio::test]
    async fn health_check_returns_ok() {
        let app = create_server(Config::default()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_completions_rejects_missing_bearer_token() {
        let app = create_server(Config::default()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server
            .post("/v1/chat/completions")
            .json(&serde_json::json!({"model": "gpt-4", "messages": []}))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn load_balancer_status_requires_admin_auth() {
        let app = create_server(Config::default()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/load-balancer/status").await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }
}
