//! End-to-end coverage of the routing pipeline through the HTTP surface:
//! budget enforcement and the streaming SSE framing that spec §8's testable
//! properties call out and that no single unit test exercises end to end.

use axum::http::StatusCode;
use axum_test::TestServer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use std::collections::HashSet;
use std::sync::Arc;

use gateway_core::channel::{CallerStatus, ChannelConfig, ChannelStatus};
use gateway_core::{CallerCredential, Channel, ModelMapping, ProviderKind};
use llm_gateway::auth::{generate_api_key, InMemoryCallerStore};
use llm_gateway::config::Config;
use llm_gateway::{build_state_with_callers, router};

async fn seeded_server(upstream_base: &str, caller: CallerCredential, api_key: &str) -> TestServer {
    let config = Config::default();
    let caller_store = Arc::new(InMemoryCallerStore::new());
    caller_store.insert(api_key, caller).await;
    let state = build_state_with_callers(&config, caller_store, Arc::new(InMemoryCallerStore::new()));

    let channel = Channel {
        id: "c1".to_string(),
        provider_kind: ProviderKind::OpenAi,
        config: ChannelConfig {
            api_base: Some(upstream_base.to_string()),
            api_key: "upstream-key".to_string(),
            ..Default::default()
        },
        weight: 1,
        priority: 0,
        status: ChannelStatus::Active,
        is_system: false,
    };
    let mapping = ModelMapping {
        channel_id: "c1".to_string(),
        public_model_id: "gpt-4".to_string(),
        upstream_model_id: "gpt-4".to_string(),
    };
    state.channel_store.upsert_channel(channel, vec![mapping]).await;

    TestServer::new(router(&config, state)).unwrap()
}

fn caller(budget_limit: f64, budget_used: f64) -> CallerCredential {
    CallerCredential {
        id: "caller-1".to_string(),
        owner_id: "owner-1".to_string(),
        allowed_models: None,
        budget_limit,
        budget_used,
        status: CallerStatus::Active,
    }
}

#[tokio::test]
async fn budget_exceeded_returns_429() {
    let upstream = MockServer::start().await;
    let key = generate_api_key();
    let server = seeded_server(&upstream.uri(), caller(1.0, 1.0), &key).await;

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", format!("Bearer {key}"))
        .json(&serde_json::json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn forbidden_model_returns_403() {
    let upstream = MockServer::start().await;
    let key = generate_api_key();
    let mut allowed = caller(10.0, 0.0);
    allowed.allowed_models = Some(HashSet::from(["gpt-3.5-turbo".to_string()]));
    let server = seeded_server(&upstream.uri(), allowed, &key).await;

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", format!("Bearer {key}"))
        .json(&serde_json::json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unary_completion_round_trips_through_mocked_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello there"},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8},
        })))
        .mount(&upstream)
        .await;

    let key = generate_api_key();
    let server = seeded_server(&upstream.uri(), caller(10.0, 0.0), &key).await;

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", format!("Bearer {key}"))
        .json(&serde_json::json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "hello there");
}

#[tokio::test]
async fn streaming_completion_ends_with_done_frame() {
    let upstream = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4\",",
        "\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"hi\"},\"finish_reason\":null}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(sse_body, "text/event-stream"),
        )
        .mount(&upstream)
        .await;

    let key = generate_api_key();
    let server = seeded_server(&upstream.uri(), caller(10.0, 0.0), &key).await;

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", format!("Bearer {key}"))
        .json(&serde_json::json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true,
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "text/event-stream");
    let body = response.text();
    assert!(body.contains("data: [DONE]"));
}
