//! # Gateway Core
//!
//! The routing brain of a multi-tenant LLM reverse proxy: health-aware load
//! balancing across upstream channels, per-channel protocol adapters that
//! normalize six wire formats into one OpenAI-compatible shape, and the
//! outcome log those decisions are scored against.
//!
//! This crate has no opinion about HTTP framing, authentication, or channel
//! administration — those are the binary crate's job. Everything here reads
//! channels and callers through narrow trait interfaces
//! ([`ChannelSource`]) and is driven by plain function calls, so it can be
//! exercised in tests without a running server.
//!
//! ## Overview
//!
//! - [`channel`] — the read-only view of admin-managed channels, model
//!   mappings, and caller credentials.
//! - [`load_balancer`] — channel selection (RANDOM, WEIGHTED_RANDOM,
//!   LOWEST_COST, BEST_PERFORMANCE), sticky routing, and health tracking.
//! - [`providers`] — one [`providers::UpstreamAdapter`] per provider kind,
//!   translating the normalized request into each upstream's wire format.
//! - [`models`] — the OpenAI-compatible request/response types every
//!   adapter normalizes into.
//! - [`outcome`] / [`metrics_store`] — the append-only record of what
//!   happened on each request, and where it is kept.
//! - [`error`] — the upstream-facing error taxonomy; the load balancer
//!   never propagates these, callers see only `record()`.
//!
//! ## Example
//!
//! ```no_run
//! use gateway_core::load_balancer::{LoadBalancer, StaticChannelSource};
//! use gateway_core::metrics_store::InMemoryMetricsStore;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let lb = LoadBalancer::new(Arc::new(InMemoryMetricsStore::new()));
//! let source = StaticChannelSource::new(vec![]);
//! let decision = lb.select(&source, "gpt-4", "owner-1", None, None).await;
//! # let _ = decision;
//! # }
//! ```

pub mod channel;
pub mod common;
pub mod error;
pub mod load_balancer;
pub mod metrics_store;
pub mod models;
pub mod outcome;
pub mod providers;

pub use channel::{CallerCredential, Channel, ChannelConfig, ChannelCostInfo, ModelCost, ModelMapping, ProviderKind};
pub use error::ProviderError;
pub use load_balancer::{LoadBalanceStrategy, LoadBalancer, LoadBalancerConfig};
pub use models::{ChatRequest, ChatResponse, Message, Role, Usage};
pub use outcome::{OutcomeStatus, RequestOutcome};
pub use providers::{create_adapter, UpstreamAdapter};
