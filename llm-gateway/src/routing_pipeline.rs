//! The routing pipeline (spec §4.4): the per-request sequence that ties
//! authentication, budget enforcement, channel selection, adapter
//! invocation, and outcome accounting into one call. Everything here is a
//! pure orchestration layer over [`gateway_core`] — no provider-specific
//! logic lives here, only the policy decisions spec §4.4 numbers 1 through 9.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;

use gateway_core::channel::CallerCredential;
use gateway_core::metrics_store::MetricsStore;
use gateway_core::models::{ChatRequest, Delta, NormalizedDelta, StreamChoice, StreamChunk};
use gateway_core::outcome::{OutcomeStatus, RequestOutcome};

use crate::auth::CallerSource;
use crate::cost::compute_cost;
use crate::gateway_error::GatewayError;
use crate::server::AppState;

/// Cache-hit heuristic (spec §4.4.2): a successful non-streaming response
/// under this latency is assumed to be a cache hit at the upstream.
const CACHE_SUSPECTED_LATENCY_MS: u64 = 50;

#[tracing::instrument(skip(state, request), fields(caller_id = %caller.id, model = %request.model))]
pub async fn route_chat_completion(
    state: &AppState,
    caller: CallerCredential,
    strategy_header: Option<&str>,
    request: ChatRequest,
) -> Result<Response, GatewayError> {
    // Step 2: per-caller model allow-list.
    if !caller.is_model_allowed(&request.model) {
        tracing::warn!(caller_id = %caller.id, model = %request.model, "model not allowed for caller");
        return Err(GatewayError::Forbidden { model: request.model.clone() });
    }

    // Step 3: pre-request budget gate.
    if !caller.has_budget() {
        tracing::warn!(caller_id = %caller.id, "budget exceeded");
        return Err(GatewayError::BudgetExceeded);
    }

    let strategy = match strategy_header {
        Some(s) => Some(s.parse().map_err(|_| GatewayError::ValidationError {
            message: format!("unknown X-LB-Strategy value: {s}"),
        })?),
        None => None,
    };

    // Step 4: channel selection.
    let (channel, mapping) = state
        .load_balancer
        .select(state.channel_store.as_ref(), &request.model, &caller.owner_id, strategy, None)
        .await
        .ok_or_else(|| {
            tracing::warn!(caller_id = %caller.id, model = %request.model, "no channel available for model");
            GatewayError::NoUpstream { model: request.model.clone() }
        })?;
    tracing::debug!(channel_id = %channel.id, model = %request.model, caller_id = %caller.id, "channel selected");

    // Step 5: upstream model id, falling back to the public id.
    let upstream_model = if mapping.upstream_model_id.is_empty() {
        request.model.clone()
    } else {
        mapping.upstream_model_id.clone()
    };

    // Step 6: accounting fallback for input tokens.
    let tokens_in_estimate = gateway_core::models::Usage::estimate_tokens(
        &request.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join(" "),
    );

    let adapter = state
        .adapters
        .get(&channel.provider_kind)
        .cloned()
        .ok_or_else(|| GatewayError::Internal {
            message: format!("no adapter registered for {:?}", channel.provider_kind),
        })?;

    if request.is_streaming() {
        Ok(route_streaming(state.clone(), caller, channel, upstream_model, request, adapter, tokens_in_estimate).await)
    } else {
        route_unary(state, caller, channel, upstream_model, request, adapter, tokens_in_estimate).await
    }
}

async fn route_unary(
    state: &AppState,
    caller: CallerCredential,
    channel: gateway_core::Channel,
    upstream_model: String,
    request: ChatRequest,
    adapter: Arc<dyn gateway_core::UpstreamAdapter>,
    tokens_in_estimate: u32,
) -> Result<Response, GatewayError> {
    let public_model = request.model.clone();
    let started = Instant::now();
    let result = adapter.chat_completion(&request, &upstream_model, &channel).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(response) => {
            let (tokens_in, tokens_out) = response
                .usage
                .map(|u| (u.prompt_tokens, u.completion_tokens))
                .unwrap_or((tokens_in_estimate, 0));
            let cache_suspected = latency_ms < CACHE_SUSPECTED_LATENCY_MS;
            let cost = compute_cost(&public_model, tokens_in, tokens_out);

            record_outcome(
                state,
                &caller,
                &channel.id,
                &public_model,
                OutcomeStatus::Success,
                tokens_in,
                tokens_out,
                cost,
                latency_ms,
                None,
            )
            .await;
            state.caller_store.add_budget_used(&caller.id, cost).await;
            state
                .load_balancer
                .record(&channel.id, &caller.owner_id, &public_model, true, latency_ms, cache_suspected)
                .await;

            Ok(Json(response).into_response())
        }
        Err(err) => {
            record_outcome(
                state,
                &caller,
                &channel.id,
                &public_model,
                OutcomeStatus::Error,
                tokens_in_estimate,
                0,
                0.0,
                latency_ms,
                Some(err.to_string()),
            )
            .await;
            state.load_balancer.record(&channel.id, &caller.owner_id, &public_model, false, latency_ms, false).await;
            Err(GatewayError::UpstreamError(err))
        }
    }
}

async fn route_streaming(
    state: AppState,
    caller: CallerCredential,
    channel: gateway_core::Channel,
    upstream_model: String,
    request: ChatRequest,
    adapter: Arc<dyn gateway_core::UpstreamAdapter>,
    tokens_in_estimate: u32,
) -> Response {
    let public_model = request.model.clone();
    let started = Instant::now();
    let stream_result = adapter.stream_chat_completion(&request, &upstream_model, &channel).await;

    let mut stream = match stream_result {
        Ok(stream) => stream,
        Err(err) => {
            let latency_ms = started.elapsed().as_millis() as u64;
            record_outcome(
                &state,
                &caller,
                &channel.id,
                &public_model,
                OutcomeStatus::Error,
                tokens_in_estimate,
                0,
                0.0,
                latency_ms,
                Some(err.to_string()),
            )
            .await;
            state.load_balancer.record(&channel.id, &caller.owner_id, &public_model, false, latency_ms, false).await;
            return GatewayError::UpstreamError(err).into_response();
        }
    };

    let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);
    let response_id = format!("chatcmpl-{}", uuid::Uuid::new_v4());

    tokio::spawn(async move {
        let created = chrono::Utc::now().timestamp();
        let mut tokens_out = 0u32;
        let mut disconnected = false;
        let mut upstream_failed: Option<String> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => {
                    if let Some(content) = &delta.content {
                        tokens_out += gateway_core::models::Usage::estimate_tokens(content);
                    }
                    let chunk = build_stream_chunk(&response_id, &public_model, created, delta);
                    let frame = format!("data: {}\n\n", serde_json::to_string(&chunk).unwrap_or_default());
                    if tx.send(frame).await.is_err() {
                        disconnected = true;
                        break;
                    }
                }
                Err(err) => {
                    let error_chunk = GatewayError::UpstreamError(err).to_sse_chunk();
                    let _ = tx.send(format!("data: {error_chunk}\n\n")).await;
                    upstream_failed = Some("upstream error mid-stream".to_string());
                    break;
                }
            }
        }

        if !disconnected {
            let _ = tx.send("data: [DONE]\n\n".to_string()).await;
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        if disconnected {
            record_outcome(
                &state,
                &caller,
                &channel.id,
                &public_model,
                OutcomeStatus::Error,
                tokens_in_estimate,
                tokens_out,
                0.0,
                latency_ms,
                Some("client disconnected mid-stream".to_string()),
            )
            .await;
            state.load_balancer.record(&channel.id, &caller.owner_id, &public_model, false, latency_ms, false).await;
        } else if let Some(message) = upstream_failed {
            record_outcome(
                &state,
                &caller,
                &channel.id,
                &public_model,
                OutcomeStatus::Error,
                tokens_in_estimate,
                tokens_out,
                0.0,
                latency_ms,
                Some(message),
            )
            .await;
            state.load_balancer.record(&channel.id, &caller.owner_id, &public_model, false, latency_ms, false).await;
        } else {
            let cost = compute_cost(&public_model, tokens_in_estimate, tokens_out);
            record_outcome(
                &state,
                &caller,
                &channel.id,
                &public_model,
                OutcomeStatus::Success,
                tokens_in_estimate,
                tokens_out,
                cost,
                latency_ms,
                None,
            )
            .await;
            state.caller_store.add_budget_used(&caller.id, cost).await;
            state.load_balancer.record(&channel.id, &caller.owner_id, &public_model, true, latency_ms, false).await;
        }
    });

    let body = Body::from_stream(async_stream::stream! {
        let mut rx = rx;
        while let Some(frame) = rx.recv().await {
            yield Ok::<axum::body::Bytes, std::io::Error>(frame.into());
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn build_stream_chunk(id: &str, public_model: &str, created: i64, delta: NormalizedDelta) -> StreamChunk {
    StreamChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: public_model.to_string(),
        choices: vec![StreamChoice {
            index: 0,
            delta: Delta { role: delta.role, content: delta.content },
            finish_reason: delta.finish_reason,
        }],
    }
}

#[allow(clippy::too_many_arguments)]
async fn record_outcome(
    state: &AppState,
    caller: &CallerCredential,
    channel_id: &str,
    model: &str,
    status: OutcomeStatus,
    tokens_in: u32,
    tokens_out: u32,
    cost: f64,
    latency_ms: u64,
    error_message: Option<String>,
) {
    let outcome = RequestOutcome {
        request_id: uuid::Uuid::new_v4().to_string(),
        caller_id: caller.id.clone(),
        owner_id: caller.owner_id.clone(),
        channel_id: channel_id.to_string(),
        model: model.to_string(),
        status,
        tokens_in,
        tokens_out,
        cost,
        latency_ms,
        error_message,
        timestamp: chrono::Utc::now(),
    };
    if let Err(err) = state.metrics_store.append(outcome).await {
        tracing::error!(channel_id, model, "failed to append request outcome: {err}");
    }
}
