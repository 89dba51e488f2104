//! HTTP handlers for the client-facing and admin-facing surfaces (spec §6).
//!
//! Client-facing handlers (`/v1/*`) authenticate against `state.caller_store`
//! and hand off to [`crate::routing_pipeline`]. Admin handlers
//! (`/channels/*`, `/load-balancer/*`) authenticate against
//! `state.admin_caller_store` — a separate identity, per spec — and talk to
//! the load balancer and channel store directly since there's no routing
//! decision to make.

use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use gateway_core::load_balancer::ChannelSource;
use gateway_core::models::{ChatRequest, ModelInfo, ModelListResponse, ProviderModel};

use crate::auth::{extract_bearer_token, CallerSource};
use crate::gateway_error::GatewayError;
use crate::server::AppState;

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<gateway_core::CallerCredential, GatewayError> {
    let header_value = headers.get("authorization").and_then(|v| v.to_str().ok());
    let token = extract_bearer_token(header_value)
        .ok_or_else(|| GatewayError::Unauthenticated { message: "missing bearer token".to_string() })?;
    state
        .caller_store
        .authenticate(token)
        .await
        .ok_or_else(|| GatewayError::Unauthenticated { message: "invalid api key".to_string() })
}

async fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> Result<gateway_core::CallerCredential, GatewayError> {
    let header_value = headers.get("authorization").and_then(|v| v.to_str().ok());
    let token = extract_bearer_token(header_value)
        .ok_or_else(|| GatewayError::Unauthenticated { message: "missing bearer token".to_string() })?;
    state
        .admin_caller_store
        .authenticate(token)
        .await
        .ok_or_else(|| GatewayError::Unauthenticated { message: "invalid admin api key".to_string() })
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, GatewayError> {
    let caller = authenticate(&state, &headers).await?;
    let strategy_header = headers.get("x-lb-strategy").and_then(|v| v.to_str().ok());
    crate::routing_pipeline::route_chat_completion(&state, caller, strategy_header, request).await
}

pub async fn list_models(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ModelListResponse>, GatewayError> {
    let caller = authenticate(&state, &headers).await?;

    let channels = state.channel_store.all_active().await;
    let mut seen = HashSet::new();
    let mut models = Vec::new();
    // Collect every public model id this gateway can currently route to.
    for channel in &channels {
        for model_id in state.channel_store.public_model_ids_for_channel(&channel.id).await {
            if !seen.insert(model_id.clone()) {
                continue;
            }
            if !caller.is_model_allowed(&model_id) {
                continue;
            }
            let provider_model = ProviderModel::new(model_id, channel.provider_kind.as_str(), channel.provider_kind.as_str());
            models.push(ModelInfo { created: Utc::now().timestamp(), ..provider_model.into() });
        }
    }

    Ok(Json(ModelListResponse::new(models)))
}

pub async fn channel_health_check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    authenticate_admin(&state, &headers).await?;
    let channel = state
        .channel_store
        .get_channel(&channel_id)
        .await
        .ok_or_else(|| GatewayError::NoUpstream { model: channel_id.clone() })?;

    state.load_balancer.probe_one(&channel).await;
    let health = state.load_balancer.health_status(&channel_id);

    Ok(Json(json!({
        "channel_id": channel_id,
        "is_healthy": health.as_ref().map(|h| h.is_healthy).unwrap_or(true),
        "check_latency_ms": health.as_ref().and_then(|h| h.last_probe_latency_ms).unwrap_or(0),
        "consecutive_failures": health.as_ref().map(|h| h.consecutive_failures).unwrap_or(0),
        "message": if health.as_ref().map(|h| h.is_healthy).unwrap_or(true) { "reachable" } else { "unreachable" },
        "checked_at": Utc::now(),
    })))
}

pub async fn channel_health_check_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, GatewayError> {
    authenticate_admin(&state, &headers).await?;
    let channels = state.channel_store.all_active().await;
    state.load_balancer.probe_all(&channels).await;

    let mut results = Vec::new();
    let mut healthy_count = 0;
    for channel in &channels {
        let health = state.load_balancer.health_status(&channel.id);
        let is_healthy = health.as_ref().map(|h| h.is_healthy).unwrap_or(true);
        if is_healthy {
            healthy_count += 1;
        }
        results.push(json!({
            "channel_id": channel.id,
            "is_healthy": is_healthy,
            "consecutive_failures": health.as_ref().map(|h| h.consecutive_failures).unwrap_or(0),
        }));
    }

    Ok(Json(json!({
        "results": results,
        "total": channels.len(),
        "healthy": healthy_count,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    pub model: String,
    #[serde(default)]
    pub window_minutes: Option<i64>,
}

pub async fn channel_performance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<String>,
    Query(query): Query<PerformanceQuery>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    authenticate_admin(&state, &headers).await?;
    let metrics = state
        .load_balancer
        .performance_metrics_with_window(&channel_id, &query.model, query.window_minutes)
        .await;
    Ok(Json(serde_json::to_value(metrics).unwrap_or_default()))
}

pub async fn load_balancer_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, GatewayError> {
    authenticate_admin(&state, &headers).await?;
    let status = state.load_balancer.status().await;
    Ok(Json(serde_json::to_value(status).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct StrategyQuery {
    pub strategy: String,
}

pub async fn set_load_balancer_strategy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StrategyQuery>,
) -> Result<StatusCode, GatewayError> {
    authenticate_admin(&state, &headers).await?;
    let strategy = query
        .strategy
        .parse()
        .map_err(|_| GatewayError::ValidationError { message: format!("unknown strategy: {}", query.strategy) })?;
    state.load_balancer.set_default_strategy(strategy).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CacheTrackingQuery {
    pub enabled: bool,
}

pub async fn set_cache_tracking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CacheTrackingQuery>,
) -> Result<StatusCode, GatewayError> {
    authenticate_admin(&state, &headers).await?;
    state.load_balancer.set_sticky_enabled(query.enabled).await;
    Ok(StatusCode::NO_CONTENT)
}
