//! The load balancer: health probing, performance analysis, sticky-route
//! tracking, and strategy-driven channel selection. The hardest-working
//! component in the crate — everything else exists to feed it inputs or
//! consume its [`LoadBalancer::select`] result.
//!
//! Ported from `original_source/backend/app/services/load_balancer.py`'s
//! `LoadBalancerService`, generalized from a single global `DashMap`-free
//! singleton into a struct whose four tables are each independently
//! key-partitioned (`dashmap::DashMap`), per spec §5's "no single global
//! lock" guidance.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::channel::{Channel, ModelMapping, ProviderKind};
use crate::metrics_store::MetricsStore;
use crate::outcome::OutcomeStatus;

/// Narrow read interface onto admin-managed channel configuration. CRUD for
/// channels and mappings lives entirely outside this crate; the load
/// balancer only ever needs "which channels can serve this model right
/// now".
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Active channels mapping `model`, paired with that mapping.
    async fn active_channels_for_model(&self, model: &str) -> Vec<(Channel, ModelMapping)>;

    async fn get_channel(&self, channel_id: &str) -> Option<Channel>;
}

/// One of the four selection strategies from spec §4.2.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    Random,
    WeightedRandom,
    LowestCost,
    BestPerformance,
}

impl FromStr for LoadBalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "weighted" | "weighted_random" => Ok(Self::WeightedRandom),
            "lowest_cost" => Ok(Self::LowestCost),
            "performance" | "best_performance" => Ok(Self::BestPerformance),
            other => Err(format!("unknown load balance strategy: {other}")),
        }
    }
}

impl std::fmt::Display for LoadBalanceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Random => "random",
            Self::WeightedRandom => "weighted_random",
            Self::LowestCost => "lowest_cost",
            Self::BestPerformance => "performance",
        };
        write!(f, "{s}")
    }
}

impl Default for LoadBalanceStrategy {
    fn default() -> Self {
        Self::WeightedRandom
    }
}

/// In-memory health record for one channel. Mutated by [`LoadBalancer::probe_all`]
/// and [`LoadBalancer::record`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHealthStatus {
    pub channel_id: String,
    pub is_healthy: bool,
    pub last_check_time: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub last_probe_latency_ms: Option<u64>,
}

/// Cached performance summary for one `(channel_id, model)` pair, valid for
/// [`LoadBalancerConfig::metrics_cache_ttl`] after `computed_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub channel_id: String,
    pub model: String,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub success_rate: f64,
    pub total_requests: u64,
    pub cache_hit_rate: f64,
    pub computed_at: DateTime<Utc>,
}

impl PerformanceMetrics {
    fn empty(channel_id: &str, model: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            model: model.to_string(),
            avg_latency_ms: 0.0,
            p50_latency_ms: 0,
            p95_latency_ms: 0,
            p99_latency_ms: 0,
            success_rate: 1.0,
            total_requests: 0,
            cache_hit_rate: 0.0,
            computed_at: Utc::now(),
        }
    }
}

/// A caller's affinity for a channel, valid until [`LoadBalancerConfig::sticky_ttl`]
/// after `last_used_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickyRoute {
    pub owner_id: String,
    pub model: String,
    pub channel_id: String,
    pub last_used_at: DateTime<Utc>,
    pub consecutive_hits: u32,
}

/// Runtime-tunable knobs, all settable without failure per spec §4.2.8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub window_minutes: i64,
    pub sticky_ttl_minutes: i64,
    pub max_consecutive_failures: u32,
    pub latency_weight: f64,
    pub default_strategy: LoadBalanceStrategy,
    pub sticky_enabled: bool,
    pub metrics_cache_ttl_minutes: i64,
    pub probe_recency_minutes: i64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            window_minutes: 30,
            sticky_ttl_minutes: 5,
            max_consecutive_failures: 3,
            latency_weight: 0.3,
            default_strategy: LoadBalanceStrategy::WeightedRandom,
            sticky_enabled: true,
            metrics_cache_ttl_minutes: 5,
            probe_recency_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancerStatus {
    pub health_entries: usize,
    pub sticky_route_entries: usize,
    pub metrics_cache_entries: usize,
    pub default_strategy: LoadBalanceStrategy,
    pub sticky_enabled: bool,
}

/// Stateful channel selector. Cheap to clone (`Arc` internals); one instance
/// per gateway process.
pub struct LoadBalancer {
    health: DashMap<String, ChannelHealthStatus>,
    metrics_cache: DashMap<(String, String), PerformanceMetrics>,
    sticky_routes: DashMap<(String, String), StickyRoute>,
    config: RwLock<LoadBalancerConfig>,
    metrics_store: Arc<dyn MetricsStore>,
    http: Client,
}

impl LoadBalancer {
    pub fn new(metrics_store: Arc<dyn MetricsStore>) -> Self {
        Self::with_config(metrics_store, LoadBalancerConfig::default())
    }

    pub fn with_config(metrics_store: Arc<dyn MetricsStore>, config: LoadBalancerConfig) -> Self {
        Self {
            health: DashMap::new(),
            metrics_cache: DashMap::new(),
            sticky_routes: DashMap::new(),
            config: RwLock::new(config),
            metrics_store,
            http: Client::builder()
                .timeout(StdDuration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }

    pub async fn set_default_strategy(&self, strategy: LoadBalanceStrategy) {
        self.config.write().await.default_strategy = strategy;
    }

    pub async fn set_sticky_enabled(&self, enabled: bool) {
        self.config.write().await.sticky_enabled = enabled;
    }

    pub async fn set_configuration(
        &self,
        window_minutes: Option<i64>,
        sticky_ttl_minutes: Option<i64>,
        max_consecutive_failures: Option<u32>,
        latency_weight: Option<f64>,
    ) {
        let mut cfg = self.config.write().await;
        if let Some(v) = window_minutes {
            cfg.window_minutes = v;
        }
        if let Some(v) = sticky_ttl_minutes {
            cfg.sticky_ttl_minutes = v;
        }
        if let Some(v) = max_consecutive_failures {
            cfg.max_consecutive_failures = v;
        }
        if let Some(v) = latency_weight {
            cfg.latency_weight = v;
        }
    }

    pub async fn status(&self) -> LoadBalancerStatus {
        let cfg = self.config.read().await;
        LoadBalancerStatus {
            health_entries: self.health.len(),
            sticky_route_entries: self.sticky_routes.len(),
            metrics_cache_entries: self.metrics_cache.len(),
            default_strategy: cfg.default_strategy,
            sticky_enabled: cfg.sticky_enabled,
        }
    }

    pub fn health_status(&self, channel_id: &str) -> Option<ChannelHealthStatus> {
        self.health.get(channel_id).map(|e| e.clone())
    }

    // ---- selection pipeline (spec §4.2.2) ----------------------------------

    pub async fn select(
        &self,
        source: &dyn ChannelSource,
        model: &str,
        caller_owner_id: &str,
        strategy: Option<LoadBalanceStrategy>,
        prefer_sticky: Option<bool>,
    ) -> Option<(Channel, ModelMapping)> {
        let candidates = source.active_channels_for_model(model).await;
        if candidates.is_empty() {
            tracing::debug!(model, "no channel maps requested model");
            return None;
        }

        let sticky_enabled = prefer_sticky.unwrap_or(self.config.read().await.sticky_enabled);
        if sticky_enabled {
            if let Some(channel_id) = self.valid_sticky_channel(caller_owner_id, model).await {
                if let Some(hit) = candidates
                    .iter()
                    .find(|(c, _)| c.id == channel_id && self.is_fast_path_healthy(&c.id))
                {
                    tracing::debug!(channel_id = %hit.0.id, model, caller_id = caller_owner_id, "sticky route hit");
                    return Some(hit.clone());
                }
            }
        }

        let (healthy, unhealthy): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|(c, _)| self.is_fast_path_healthy(&c.id));
        let degraded = healthy.is_empty();
        let pool = if !degraded { healthy } else { unhealthy };
        if pool.is_empty() {
            tracing::warn!(model, caller_id = caller_owner_id, "no channel available for model");
            return None;
        }
        if degraded {
            tracing::warn!(model, "all channels unhealthy, selecting in degraded mode");
        }

        let strategy = strategy.unwrap_or(self.config.read().await.default_strategy);
        let (channel, mapping) = self.apply_strategy(strategy, pool, model).await;
        tracing::debug!(channel_id = %channel.id, model, caller_id = caller_owner_id, ?strategy, "channel selected");
        Some((channel, mapping))
    }

    /// Fast-path predicate from spec §4.2.3: healthy unless the failure
    /// streak has crossed the threshold, or the most recent probe (if taken
    /// within the recency window) said unhealthy.
    fn is_fast_path_healthy(&self, channel_id: &str) -> bool {
        let Some(entry) = self.health.get(channel_id) else {
            return true;
        };
        // max_consecutive_failures is read without awaiting the config lock
        // here; callers hold no write lock across this call so a blocking
        // read is fine and keeps this predicate synchronous.
        let max_failures = self
            .config
            .try_read()
            .map(|c| c.max_consecutive_failures)
            .unwrap_or(3);
        if entry.consecutive_failures >= max_failures {
            return false;
        }
        let recency = self
            .config
            .try_read()
            .map(|c| Duration::minutes(c.probe_recency_minutes))
            .unwrap_or_else(|_| Duration::minutes(5));
        let recent = Utc::now() - entry.last_check_time <= recency;
        if recent {
            entry.is_healthy
        } else {
            true
        }
    }

    async fn valid_sticky_channel(&self, owner_id: &str, model: &str) -> Option<String> {
        let key = (owner_id.to_string(), model.to_string());
        let ttl = Duration::minutes(self.config.read().await.sticky_ttl_minutes);
        if let Some(entry) = self.sticky_routes.get(&key) {
            if Utc::now() - entry.last_used_at <= ttl {
                return Some(entry.channel_id.clone());
            }
        }
        self.sticky_routes.remove(&key);
        None
    }

    async fn apply_strategy(
        &self,
        strategy: LoadBalanceStrategy,
        pool: Vec<(Channel, ModelMapping)>,
        model: &str,
    ) -> (Channel, ModelMapping) {
        match strategy {
            LoadBalanceStrategy::Random => select_random(&pool),
            LoadBalanceStrategy::WeightedRandom => select_weighted_random(&pool),
            LoadBalanceStrategy::LowestCost => {
                let mut scored = Vec::with_capacity(pool.len());
                for (channel, mapping) in &pool {
                    let metrics = self.performance_metrics(&channel.id, model).await;
                    let cost_info = channel.cost_info(model);
                    let success_rate = if metrics.total_requests > 0 {
                        metrics.success_rate.max(0.1)
                    } else {
                        1.0
                    };
                    scored.push((cost_info.average_cost_per_request() / success_rate, (channel.clone(), mapping.clone())));
                }
                select_lowest_cohort(scored)
            }
            LoadBalanceStrategy::BestPerformance => {
                let mut scored = Vec::with_capacity(pool.len());
                for (channel, mapping) in &pool {
                    let metrics = self.performance_metrics(&channel.id, model).await;
                    let score = if metrics.total_requests == 0 {
                        0.5
                    } else {
                        let latency_score = (1.0 - metrics.p95_latency_ms as f64 / 10_000.0).max(0.0);
                        0.7 * metrics.success_rate + 0.3 * latency_score
                    };
                    scored.push((score, (channel.clone(), mapping.clone())));
                }
                select_best_cohort(scored)
            }
        }
    }

    // ---- outcome feedback (spec §4.2.7) ------------------------------------

    pub async fn record(
        &self,
        channel_id: &str,
        owner_id: &str,
        model: &str,
        success: bool,
        latency_ms: u64,
        cache_suspected: bool,
    ) {
        {
            let mut entry = self.health.entry(channel_id.to_string()).or_insert_with(|| {
                ChannelHealthStatus {
                    channel_id: channel_id.to_string(),
                    is_healthy: true,
                    last_check_time: Utc::now(),
                    consecutive_failures: 0,
                    last_probe_latency_ms: None,
                }
            });
            if success {
                entry.consecutive_failures = 0;
            } else {
                entry.consecutive_failures += 1;
                tracing::debug!(channel_id, owner_id, model, consecutive_failures = entry.consecutive_failures, "recorded failed outcome");
            }
        }

        let sticky_key = (owner_id.to_string(), model.to_string());
        if success {
            if cache_suspected || latency_ms < 50 {
                let consecutive_hits = self
                    .sticky_routes
                    .get(&sticky_key)
                    .map(|e| {
                        if e.channel_id == channel_id {
                            e.consecutive_hits + 1
                        } else {
                            1
                        }
                    })
                    .unwrap_or(1);
                self.sticky_routes.insert(
                    sticky_key,
                    StickyRoute {
                        owner_id: owner_id.to_string(),
                        model: model.to_string(),
                        channel_id: channel_id.to_string(),
                        last_used_at: Utc::now(),
                        consecutive_hits,
                    },
                );
            }
        } else if let Some(entry) = self.sticky_routes.get(&sticky_key) {
            if entry.channel_id == channel_id {
                drop(entry);
                self.sticky_routes.remove(&sticky_key);
            }
        }
    }

    // ---- performance analysis (spec §4.2.5) --------------------------------

    pub async fn performance_metrics(&self, channel_id: &str, model: &str) -> PerformanceMetrics {
        self.performance_metrics_with_window(channel_id, model, None).await
    }

    /// Same as [`Self::performance_metrics`], but lets a caller override the
    /// lookback window (spec §6's `?window_minutes=` admin query parameter)
    /// instead of `LoadBalancerConfig::window_minutes`. An explicit override
    /// bypasses the cache, since the cache is keyed only by
    /// `(channel_id, model)` and would otherwise return a different window's
    /// numbers.
    pub async fn performance_metrics_with_window(
        &self,
        channel_id: &str,
        model: &str,
        window_override: Option<i64>,
    ) -> PerformanceMetrics {
        let key = (channel_id.to_string(), model.to_string());
        if window_override.is_none() {
            let ttl_minutes = self.config.read().await.metrics_cache_ttl_minutes;
            if let Some(cached) = self.metrics_cache.get(&key) {
                if Utc::now() - cached.computed_at <= Duration::minutes(ttl_minutes) {
                    return cached.clone();
                }
            }
        }

        let window_minutes = match window_override {
            Some(minutes) => minutes,
            None => self.config.read().await.window_minutes,
        };
        let since = Utc::now() - Duration::minutes(window_minutes);
        let outcomes = self
            .metrics_store
            .query(channel_id, model, since)
            .await
            .unwrap_or_default();

        let metrics = if outcomes.is_empty() {
            PerformanceMetrics::empty(channel_id, model)
        } else {
            let total = outcomes.len();
            let errors = outcomes
                .iter()
                .filter(|o| o.status == OutcomeStatus::Error)
                .count();
            let success_rate = (total - errors) as f64 / total as f64;

            let mut latencies: Vec<u64> = outcomes
                .iter()
                .filter(|o| o.status == OutcomeStatus::Success)
                .map(|o| o.latency_ms)
                .collect();
            latencies.sort_unstable();

            let avg_latency_ms = if latencies.is_empty() {
                0.0
            } else {
                latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
            };
            let cache_hit_rate = if latencies.is_empty() {
                0.0
            } else {
                latencies.iter().filter(|&&l| l < 50).count() as f64 / latencies.len() as f64
            };

            PerformanceMetrics {
                channel_id: channel_id.to_string(),
                model: model.to_string(),
                avg_latency_ms,
                p50_latency_ms: nearest_rank(&latencies, 0.50),
                p95_latency_ms: nearest_rank(&latencies, 0.95),
                p99_latency_ms: nearest_rank(&latencies, 0.99),
                success_rate,
                total_requests: total as u64,
                cache_hit_rate,
                computed_at: Utc::now(),
            }
        };

        if window_override.is_none() {
            self.metrics_cache.insert(key, metrics.clone());
        }
        metrics
    }

    // ---- health probing (spec §4.2.6) --------------------------------------

    pub async fn probe_all(&self, channels: &[Channel]) {
        let futures = channels
            .iter()
            .filter(|c| c.is_active())
            .map(|c| self.probe_one(c));
        futures::future::join_all(futures).await;
    }

    pub async fn probe_one(&self, channel: &Channel) {
        let start = Utc::now();
        let result = probe_channel(&self.http, channel).await;
        let latency_ms = (Utc::now() - start).num_milliseconds().max(0) as u64;

        let mut entry = self.health.entry(channel.id.clone()).or_insert_with(|| {
            ChannelHealthStatus {
                channel_id: channel.id.clone(),
                is_healthy: true,
                last_check_time: Utc::now(),
                consecutive_failures: 0,
                last_probe_latency_ms: None,
            }
        });
        entry.last_check_time = Utc::now();
        entry.last_probe_latency_ms = Some(latency_ms);
        let was_healthy = entry.is_healthy;
        match result {
            Ok(true) => {
                entry.is_healthy = true;
                entry.consecutive_failures = 0;
                if !was_healthy {
                    tracing::info!(channel_id = %channel.id, latency_ms, "channel probe recovered, marking healthy");
                }
            }
            _ => {
                entry.is_healthy = false;
                entry.consecutive_failures += 1;
                if was_healthy {
                    tracing::warn!(channel_id = %channel.id, latency_ms, "channel probe failed, marking unhealthy");
                }
            }
        }
    }
}

fn nearest_rank(sorted_ascending: &[u64], fraction: f64) -> u64 {
    if sorted_ascending.is_empty() {
        return 0;
    }
    let idx = ((sorted_ascending.len() as f64) * fraction).floor() as usize;
    let idx = idx.min(sorted_ascending.len() - 1);
    sorted_ascending[idx]
}

fn select_random(pool: &[(Channel, ModelMapping)]) -> (Channel, ModelMapping) {
    let idx = rand::thread_rng().gen_range(0..pool.len());
    pool[idx].clone()
}

fn select_weighted_random(pool: &[(Channel, ModelMapping)]) -> (Channel, ModelMapping) {
    let total_weight: u64 = pool.iter().map(|(c, _)| c.weight as u64).sum();
    if total_weight == 0 {
        return select_random(pool);
    }
    let draw = rand::thread_rng().gen_range(0..total_weight);
    let mut cumulative = 0u64;
    for (channel, mapping) in pool {
        cumulative += channel.weight as u64;
        if cumulative > draw {
            return (channel.clone(), mapping.clone());
        }
    }
    pool.last().expect("pool non-empty").clone()
}

/// Lowest-cost cohort: every candidate within 1e-3 of the minimum score,
/// capped at 3, with a uniform random tie-break — spec §4.2.4.
fn select_lowest_cohort(
    mut scored: Vec<(f64, (Channel, ModelMapping))>,
) -> (Channel, ModelMapping) {
    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let min = scored[0].0;
    let cohort: Vec<_> = scored
        .into_iter()
        .take_while(|(score, _)| (score - min).abs() <= 1e-3)
        .take(3)
        .map(|(_, item)| item)
        .collect();
    let idx = rand::thread_rng().gen_range(0..cohort.len());
    cohort[idx].clone()
}

/// Best-performance cohort: top 3 by descending score, uniform random pick
/// — spec §4.2.4.
fn select_best_cohort(mut scored: Vec<(f64, (Channel, ModelMapping))>) -> (Channel, ModelMapping) {
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let cohort: Vec<_> = scored.into_iter().take(3).map(|(_, item)| item).collect();
    let idx = rand::thread_rng().gen_range(0..cohort.len());
    cohort[idx].clone()
}

/// One provider-kind-specific reachability probe. Returns `Ok(true)` for a
/// healthy response, `Ok(false)` for a reachable-but-unhealthy response, and
/// `Err` for transport failure/timeout — both non-`Ok(true)` cases count as
/// a failure for the caller's consecutive-failure bookkeeping.
async fn probe_channel(http: &Client, channel: &Channel) -> Result<bool, reqwest::Error> {
    let kind = channel.provider_kind;
    let base = channel.config.api_base_or_default(kind);
    let version = channel.config.api_version_or_default(kind);

    let request = match kind {
        ProviderKind::OpenAi | ProviderKind::Mistral | ProviderKind::Cohere => http
            .get(format!("{base}/v1/models"))
            .bearer_auth(&channel.config.api_key),
        ProviderKind::Azure => http
            .get(format!("{base}/openai/models?api-version={version}"))
            .header("api-key", &channel.config.api_key),
        ProviderKind::Gemini => {
            http.get(format!("{base}/{version}/models?key={}", channel.config.api_key))
        }
        ProviderKind::Anthropic => {
            let body = serde_json::json!({
                "model": "claude-3-haiku-20240307",
                "max_tokens": 1,
                "messages": [{"role": "user", "content": "hi"}],
            });
            http.post(format!("{base}/v1/messages"))
                .header("x-api-key", &channel.config.api_key)
                .header("anthropic-version", version)
                .json(&body)
        }
    };

    let response = request.timeout(StdDuration::from_secs(10)).send().await?;
    let status = response.status().as_u16();
    Ok(match kind {
        ProviderKind::Anthropic => matches!(status, 200 | 400 | 429),
        _ => status == 200,
    })
}

/// Static fallback channel registry, used by tests and as a minimal example
/// of [`ChannelSource`].
pub struct StaticChannelSource {
    entries: Vec<(Channel, ModelMapping)>,
}

impl StaticChannelSource {
    pub fn new(entries: Vec<(Channel, ModelMapping)>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl ChannelSource for StaticChannelSource {
    async fn active_channels_for_model(&self, model: &str) -> Vec<(Channel, ModelMapping)> {
        self.entries
            .iter()
            .filter(|(c, m)| c.is_active() && m.public_model_id == model)
            .cloned()
            .collect()
    }

    async fn get_channel(&self, channel_id: &str) -> Option<Channel> {
        self.entries
            .iter()
            .find(|(c, _)| c.id == channel_id)
            .map(|(c, _)| c.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelConfig, ChannelStatus};
    use crate::metrics_store::InMemoryMetricsStore;

    fn channel(id: &str, weight: u32) -> Channel {
        Channel {
            id: id.to_string(),
            provider_kind: ProviderKind::OpenAi,
            config: ChannelConfig {
                api_key: "k".into(),
                ..Default::default()
            },
            weight,
            priority: 0,
            status: ChannelStatus::Active,
            is_system: false,
        }
    }

    fn mapping(channel_id: &str, model: &str) -> ModelMapping {
        ModelMapping {
            channel_id: channel_id.to_string(),
            public_model_id: model.to_string(),
            upstream_model_id: model.to_string(),
        }
    }

    fn lb() -> LoadBalancer {
        LoadBalancer::new(Arc::new(InMemoryMetricsStore::new()))
    }

    #[tokio::test]
    async fn select_returns_none_when_no_channel_maps_model() {
        let lb = lb();
        let source = StaticChannelSource::new(vec![]);
        assert!(lb.select(&source, "gpt-4", "owner", None, None).await.is_none());
    }

    #[tokio::test]
    async fn degraded_mode_returns_unhealthy_when_all_unhealthy() {
        let lb = lb();
        let ch = channel("ch1", 1);
        lb.record("ch1", "owner", "gpt-4", false, 100, false).await;
        for _ in 0..5 {
            lb.record("ch1", "owner", "gpt-4", false, 100, false).await;
        }
        let source = StaticChannelSource::new(vec![(ch, mapping("ch1", "gpt-4"))]);
        let result = lb.select(&source, "gpt-4", "owner", Some(LoadBalanceStrategy::Random), None).await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn consecutive_failures_reset_on_success() {
        let lb = lb();
        lb.record("ch1", "owner", "gpt-4", false, 100, false).await;
        lb.record("ch1", "owner", "gpt-4", false, 100, false).await;
        assert_eq!(lb.health_status("ch1").unwrap().consecutive_failures, 2);
        lb.record("ch1", "owner", "gpt-4", true, 100, false).await;
        assert_eq!(lb.health_status("ch1").unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn channel_excluded_after_max_consecutive_failures() {
        let lb = lb();
        for _ in 0..3 {
            lb.record("ch1", "owner", "gpt-4", false, 100, false).await;
        }
        assert!(!lb.is_fast_path_healthy("ch1"));
    }

    #[tokio::test]
    async fn sticky_route_created_on_low_latency_success_and_read_back() {
        let lb = lb();
        lb.record("ch1", "owner", "gpt-4", true, 10, false).await;
        let hit = lb.valid_sticky_channel("owner", "gpt-4").await;
        assert_eq!(hit, Some("ch1".to_string()));
    }

    #[tokio::test]
    async fn sticky_route_invalidated_on_matching_failure() {
        let lb = lb();
        lb.record("ch1", "owner", "gpt-4", true, 10, false).await;
        lb.record("ch1", "owner", "gpt-4", false, 500, false).await;
        assert_eq!(lb.valid_sticky_channel("owner", "gpt-4").await, None);
    }

    #[tokio::test]
    async fn weighted_random_converges_to_weight_ratio() {
        let lb = lb();
        let pool = vec![
            (channel("heavy", 70), mapping("heavy", "gpt-4")),
            (channel("light", 30), mapping("light", "gpt-4")),
        ];
        let mut heavy_count = 0;
        for _ in 0..10_000 {
            let (c, _) = lb.apply_strategy(LoadBalanceStrategy::WeightedRandom, pool.clone(), "gpt-4").await;
            if c.id == "heavy" {
                heavy_count += 1;
            }
        }
        let ratio = heavy_count as f64 / 10_000.0;
        assert!((0.65..=0.75).contains(&ratio), "ratio was {ratio}");
    }

    #[tokio::test]
    async fn zero_weight_sum_falls_back_to_random() {
        let pool = vec![
            (channel("a", 0), mapping("a", "gpt-4")),
            (channel("b", 0), mapping("b", "gpt-4")),
        ];
        // should not panic and should return one of the two
        let (c, _) = select_weighted_random(&pool);
        assert!(c.id == "a" || c.id == "b");
    }

    #[tokio::test]
    async fn empty_window_metrics_have_full_success_rate() {
        let lb = lb();
        let metrics = lb.performance_metrics("unknown-channel", "gpt-4").await;
        assert_eq!(metrics.success_rate, 1.0);
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.p95_latency_ms, 0);
    }

    #[tokio::test]
    async fn window_override_bypasses_cache_and_default() {
        let lb = lb();
        lb.record("ch1", "owner", "gpt-4", true, 10, false).await;

        let cached = lb.performance_metrics("ch1", "gpt-4").await;
        assert_eq!(cached.total_requests, 0, "in-memory metrics store has no outcome history to query");

        let overridden = lb.performance_metrics_with_window("ch1", "gpt-4", Some(1)).await;
        assert_eq!(overridden.channel_id, "ch1");
        assert!(!lb.metrics_cache.contains_key(&("ch1".to_string(), "gpt-4".to_string())));
    }
}
