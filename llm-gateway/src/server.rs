//! # HTTP Server
//!
//! Builds the Axum router and the shared [`AppState`] every handler closes
//! over. Bootstrap here is deliberately narrow: this crate owns routing,
//! not identity or channel administration, so there's no client/plugin/cache
//! manager to assemble — just the load balancer, the in-process caller and
//! channel tables, and one adapter per provider kind.
//!
//! ## Middleware stack
//!
//! 1. **Timeout** — bounds every request to `config.server.timeout`.
//! 2. **CORS** — per `config.server.cors`.
//! 3. **Tracing** — request/response spans via `tower_http::trace::TraceLayer`.
//!
//! Authentication is not a middleware layer here: each handler resolves its
//! own caller identity (client vs. admin) because the two surfaces use
//! different caller tables.

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use gateway_core::channel::ProviderKind;
use gateway_core::load_balancer::LoadBalancer;
use gateway_core::metrics_store::{InMemoryMetricsStore, MetricsStore};
use gateway_core::providers::create_adapter;
use gateway_core::UpstreamAdapter;

use crate::auth::{CallerSource, InMemoryCallerStore};
use crate::channel_store::InMemoryChannelStore;
use crate::config::Config;
use crate::handlers;

/// Shared state every handler closes over. Cheap to clone: every field is
/// an `Arc`.
pub struct AppState {
    pub config: Arc<Config>,
    pub channel_store: Arc<InMemoryChannelStore>,
    pub caller_store: Arc<dyn CallerSource>,
    pub admin_caller_store: Arc<dyn CallerSource>,
    pub load_balancer: Arc<LoadBalancer>,
    pub adapters: HashMap<ProviderKind, Arc<dyn UpstreamAdapter>>,
    pub metrics_store: Arc<dyn MetricsStore>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            channel_store: self.channel_store.clone(),
            caller_store: self.caller_store.clone(),
            admin_caller_store: self.admin_caller_store.clone(),
            load_balancer: self.load_balancer.clone(),
            adapters: self.adapters.clone(),
            metrics_store: self.metrics_store.clone(),
        }
    }
}

const ALL_PROVIDER_KINDS: [ProviderKind; 6] = [
    ProviderKind::OpenAi,
    ProviderKind::Azure,
    ProviderKind::Anthropic,
    ProviderKind::Gemini,
    ProviderKind::Mistral,
    ProviderKind::Cohere,
];

/// Assemble the shared state: load balancer, one adapter per provider kind,
/// and empty channel/caller tables. Channel, model-mapping, and caller
/// provisioning are left to the caller (tests and the binary entry point
/// populate `channel_store`/`caller_store` after this returns) since that
/// data comes from outside this crate's scope.
pub fn build_state(config: &Config) -> AppState {
    build_state_with_callers(config, Arc::new(InMemoryCallerStore::new()), Arc::new(InMemoryCallerStore::new()))
}

/// Same as [`build_state`], but takes the caller tables instead of creating
/// them. Lets callers keep a concrete `Arc<InMemoryCallerStore>` handle to
/// seed credentials into before the router is built, since `AppState` only
/// exposes the trait-object view.
pub fn build_state_with_callers(
    config: &Config,
    caller_store: Arc<InMemoryCallerStore>,
    admin_caller_store: Arc<InMemoryCallerStore>,
) -> AppState {
    let metrics_store: Arc<dyn MetricsStore> = Arc::new(InMemoryMetricsStore::new());
    let load_balancer = Arc::new(LoadBalancer::with_config(metrics_store.clone(), config.load_balancer.clone()));

    let adapters = ALL_PROVIDER_KINDS
        .into_iter()
        .map(|kind| (kind, Arc::from(create_adapter(kind))))
        .collect();

    AppState {
        config: Arc::new(config.clone()),
        channel_store: Arc::new(InMemoryChannelStore::new()),
        caller_store,
        admin_caller_store,
        load_balancer,
        adapters,
        metrics_store,
    }
}

/// Build the router for an already-assembled [`AppState`]. Split out from
/// [`create_server`] so tests can seed `state.channel_store`/`caller_store`
/// before the router starts serving.
pub fn router(config: &Config, state: AppState) -> Router {
    if config.server.cors.enabled && config.server.cors.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS is enabled with wildcard origins; restrict allowed_origins in production");
    }

    let cors = if config.server.cors.enabled {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/health", get(handlers::health_check))
        .route("/channels/{id}/health-check", post(handlers::channel_health_check))
        .route("/channels/health-check/all", post(handlers::channel_health_check_all))
        .route("/channels/{id}/performance", get(handlers::channel_performance))
        .route("/load-balancer/status", get(handlers::load_balancer_status))
        .route("/load-balancer/strategy", post(handlers::set_load_balancer_strategy))
        .route("/load-balancer/cache-tracking", post(handlers::set_cache_tracking))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(config.server.timeout))
                .layer(cors),
        )
        .with_state(state)
}

/// Build the router and its state in one call, for the binary entry point
/// and tests that don't need to provision channels or callers.
pub async fn create_server(config: Config) -> anyhow::Result<Router> {
    let state = build_state(&config);
    Ok(router(&config, state))
}
