//! Channel and model-mapping types — the read-only view the core has of
//! admin-managed upstream configuration.
//!
//! Everything in this module is data the gateway core *reads*; creating,
//! updating, or deleting channels is an admin-plane concern the core never
//! touches (see [`crate::ChannelSource`]).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Which upstream wire protocol a channel speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Azure,
    Anthropic,
    Gemini,
    Mistral,
    Cohere,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Cohere => "cohere",
        }
    }

    /// Per-1K-token input/output defaults used when a channel supplies
    /// neither a per-model nor a channel-wide cost override.
    ///
    /// Mirrors `original_source/.../load_balancer.py::get_channel_cost_info`'s
    /// hardcoded provider defaults.
    pub fn default_cost(&self) -> ModelCost {
        match self {
            ProviderKind::OpenAi | ProviderKind::Azure => ModelCost {
                input: 0.01,
                output: 0.03,
            },
            ProviderKind::Anthropic => ModelCost {
                input: 0.008,
                output: 0.024,
            },
            ProviderKind::Gemini => ModelCost {
                input: 0.0005,
                output: 0.0015,
            },
            ProviderKind::Mistral | ProviderKind::Cohere => ModelCost {
                input: 0.01,
                output: 0.03,
            },
        }
    }
}

/// Per-1K-token price pair, input and output priced independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    pub input: f64,
    pub output: f64,
}

impl ModelCost {
    pub fn avg(&self) -> f64 {
        (self.input + self.output) / 2.0
    }
}

/// A channel's resolved per-1K-token price for one model, as LOWEST_COST
/// scores candidates against (spec §4.2.4). Kept as its own return shape
/// rather than the bare `ModelCost` average so a caller can see which
/// channel/model a scored cost came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCostInfo {
    pub channel_id: String,
    pub model: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl ChannelCostInfo {
    /// Estimated cost of a typical request, assuming an even split between
    /// input and output tokens.
    pub fn average_cost_per_request(&self) -> f64 {
        (self.input_cost_per_1k + self.output_cost_per_1k) / 2.0
    }
}

/// Free-form per-channel configuration, as posted through the admin plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub api_base: Option<String>,
    pub api_key: String,
    pub api_version: Option<String>,
    pub organization: Option<String>,
    #[serde(default)]
    pub model_costs: HashMap<String, ModelCost>,
    pub default_costs: Option<ModelCost>,
}

impl ChannelConfig {
    /// Resolve the cost to use for `model`, cascading
    /// `model_costs[model]` -> `default_costs` -> provider-kind built-in
    /// default, per spec's LOWEST_COST cost resolution.
    pub fn resolve_cost(&self, model: &str, kind: ProviderKind) -> ModelCost {
        self.model_costs
            .get(model)
            .copied()
            .or(self.default_costs)
            .unwrap_or_else(|| kind.default_cost())
    }

    pub fn api_base_or_default(&self, kind: ProviderKind) -> String {
        self.api_base.clone().unwrap_or_else(|| {
            match kind {
                ProviderKind::OpenAi => "https://api.openai.com/v1",
                ProviderKind::Azure => "",
                ProviderKind::Anthropic => "https://api.anthropic.com",
                ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
                ProviderKind::Mistral => "https://api.mistral.ai",
                ProviderKind::Cohere => "https://api.cohere.com",
            }
            .to_string()
        })
    }

    pub fn api_version_or_default(&self, kind: ProviderKind) -> String {
        self.api_version.clone().unwrap_or_else(|| {
            match kind {
                ProviderKind::Azure => "2024-02-01",
                ProviderKind::Anthropic => "2023-06-01",
                ProviderKind::Gemini => "v1beta",
                _ => "",
            }
            .to_string()
        })
    }
}

/// Administrative lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Active,
    Inactive,
    Error,
}

/// An upstream credential/endpoint pair the load balancer may route to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub provider_kind: ProviderKind,
    pub config: ChannelConfig,
    pub weight: u32,
    pub priority: i32,
    pub status: ChannelStatus,
    pub is_system: bool,
}

impl Channel {
    pub fn is_active(&self) -> bool {
        self.status == ChannelStatus::Active
    }

    /// Resolve this channel's cost for `model`, per the cascade
    /// `ChannelConfig::resolve_cost` documents.
    pub fn cost_info(&self, model: &str) -> ChannelCostInfo {
        let cost = self.config.resolve_cost(model, self.provider_kind);
        ChannelCostInfo {
            channel_id: self.id.clone(),
            model: model.to_string(),
            input_cost_per_1k: cost.input,
            output_cost_per_1k: cost.output,
        }
    }
}

/// A public model id's mapping to the upstream-native model id on one
/// channel. Read-only from the core's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMapping {
    pub channel_id: String,
    pub public_model_id: String,
    pub upstream_model_id: String,
}

/// Lifecycle status of a caller's credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerStatus {
    Active,
    Disabled,
}

/// The subset of a caller's credential the core needs: what they're allowed
/// to call and how much budget remains. Credential storage and issuance are
/// out of scope; this is a read (and budget-increment) view only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerCredential {
    pub id: String,
    pub owner_id: String,
    pub allowed_models: Option<HashSet<String>>,
    pub budget_limit: f64,
    pub budget_used: f64,
    pub status: CallerStatus,
}

impl CallerCredential {
    pub fn is_model_allowed(&self, model: &str) -> bool {
        match &self.allowed_models {
            Some(allowed) => allowed.contains(model),
            None => true,
        }
    }

    /// `budget_limit <= 0` means unlimited, per spec §4.4 step 3.
    pub fn has_budget(&self) -> bool {
        self.budget_limit <= 0.0 || self.budget_used < self.budget_limit
    }
}

/// Minimal [`Channel`] construction for adapter and load-balancer tests.
#[cfg(test)]
pub mod test_support {
    use super::*;

    pub fn channel(id: &str, kind: ProviderKind, api_base: Option<String>) -> Channel {
        Channel {
            id: id.to_string(),
            provider_kind: kind,
            config: ChannelConfig {
                api_base,
                api_key: "test-key".to_string(),
                ..Default::default()
            },
            weight: 1,
            priority: 0,
            status: ChannelStatus::Active,
            is_system: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_resolution_cascades() {
        let mut config = ChannelConfig {
            api_key: "k".into(),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_cost("gpt-4", ProviderKind::OpenAi),
            ProviderKind::OpenAi.default_cost()
        );

        config.default_costs = Some(ModelCost {
            input: 0.02,
            output: 0.04,
        });
        assert_eq!(
            config.resolve_cost("gpt-4", ProviderKind::OpenAi),
            ModelCost {
                input: 0.02,
                output: 0.04
            }
        );

        config.model_costs.insert(
            "gpt-4".to_string(),
            ModelCost {
                input: 0.03,
                output: 0.06,
            },
        );
        assert_eq!(
            config.resolve_cost("gpt-4", ProviderKind::OpenAi),
            ModelCost {
                input: 0.03,
                output: 0.06
            }
        );
    }

    #[test]
    fn unlimited_budget_when_limit_not_positive() {
        let caller = CallerCredential {
            id: "c".into(),
            owner_id: "o".into(),
            allowed_models: None,
            budget_limit: 0.0,
            budget_used: 1_000_000.0,
            status: CallerStatus::Active,
        };
        assert!(caller.has_budget());
    }

    #[test]
    fn allowed_models_none_means_all_allowed() {
        let caller = CallerCredential {
            id: "c".into(),
            owner_id: "o".into(),
            allowed_models: None,
            budget_limit: 10.0,
            budget_used: 0.0,
            status: CallerStatus::Active,
        };
        assert!(caller.is_model_allowed("anything"));
    }

    #[test]
    fn cost_info_averages_input_and_output() {
        let channel = test_support::channel("c1", ProviderKind::OpenAi, None);
        let info = channel.cost_info("gpt-4");
        assert_eq!(info.channel_id, "c1");
        assert_eq!(info.average_cost_per_request(), (info.input_cost_per_1k + info.output_cost_per_1k) / 2.0);
    }
}
