//! # Configuration
//!
//! TOML file plus environment variable overrides, the way the teacher's own
//! `config.rs` layers them. What's configurable here is deliberately
//! narrower than a full gateway's config surface (spec §1 puts channel/
//! provider administration, auth, and caching out of scope) — this covers
//! only the ambient stack: server binding, the load balancer's runtime
//! knobs (spec §6 "Environment/configuration parameters"), logging, and
//! metrics retention.

use std::env;
use std::time::Duration;

use gateway_core::load_balancer::LoadBalancerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "gateway_core::common::duration_serde")]
    pub timeout: Duration,
    pub max_body_size: usize,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string()],
            allowed_headers: vec!["authorization".to_string(), "content-type".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// Spec §6's metrics window knob plus the ambient retention/cleanup
/// schedule the teacher carries for its own metrics module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    #[serde(with = "gateway_core::common::duration_serde")]
    pub retention_duration: Duration,
    #[serde(with = "gateway_core::common::duration_serde")]
    pub cleanup_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_duration: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            timeout: Duration::from_secs(120),
            max_body_size: 10 * 1024 * 1024,
            cors: CorsConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(_) => {
                tracing::warn!("no config file at {path}, using defaults");
                Config::default()
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(host) = env::var("GATEWAY_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port_str) = env::var("GATEWAY_PORT") {
            self.server.port = port_str
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid GATEWAY_PORT: {port_str}"))?;
        }
        if let Ok(timeout) = env::var("GATEWAY_TIMEOUT") {
            self.server.timeout = gateway_core::common::duration_serde::parse_duration_string(&timeout)
                .map_err(|e| anyhow::anyhow!("invalid GATEWAY_TIMEOUT: {e}"))?;
        }
        if let Ok(level) = env::var("GATEWAY_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(strategy) = env::var("GATEWAY_DEFAULT_STRATEGY") {
            self.load_balancer.default_strategy = strategy
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid GATEWAY_DEFAULT_STRATEGY: {e}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server port must be nonzero"));
        }
        if self.server.timeout.as_secs() == 0 {
            return Err(anyhow::anyhow!("server timeout cannot be 0"));
        }
        if self.load_balancer.max_consecutive_failures == 0 {
            return Err(anyhow::anyhow!("max_consecutive_failures must be at least 1"));
        }
        if self.load_balancer.window_minutes <= 0 {
            return Err(anyhow::anyhow!("window_minutes must be positive"));
        }
        if self.metrics.enabled && self.metrics.retention_duration.as_secs() == 0 {
            return Err(anyhow::anyhow!("retention_duration cannot be 0 when metrics is enabled"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_missing() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config.server.port, 3000);
    }
}
