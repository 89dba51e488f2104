//! In-process [`ChannelSource`] implementation.
//!
//! Channel and model-mapping CRUD is explicitly out of this crate's scope
//! (spec §1) — they're admin-managed elsewhere. What this crate needs is
//! something that implements the narrow read trait the load balancer
//! consumes. This is that something: a table loaded once at startup from
//! config, swappable for a database-backed implementation without touching
//! `routing_pipeline.rs` or `load_balancer.rs`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use gateway_core::load_balancer::ChannelSource;
use gateway_core::{Channel, ModelMapping};

#[derive(Default)]
pub struct InMemoryChannelStore {
    channels: RwLock<HashMap<String, Channel>>,
    mappings: RwLock<HashMap<String, Vec<ModelMapping>>>,
}

impl InMemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace semantics (spec §9: delete-then-insert, not the source's
    /// buggy append-only update).
    pub async fn upsert_channel(&self, channel: Channel, model_mappings: Vec<ModelMapping>) {
        let channel_id = channel.id.clone();
        self.channels.write().await.insert(channel_id.clone(), channel);
        self.mappings.write().await.insert(channel_id, model_mappings);
    }

    pub async fn remove_channel(&self, channel_id: &str) {
        self.channels.write().await.remove(channel_id);
        self.mappings.write().await.remove(channel_id);
    }

    pub async fn all_active(&self) -> Vec<Channel> {
        self.channels.read().await.values().filter(|c| c.is_active()).cloned().collect()
    }

    pub async fn public_model_ids_for_channel(&self, channel_id: &str) -> Vec<String> {
        self.mappings
            .read()
            .await
            .get(channel_id)
            .map(|entries| entries.iter().map(|m| m.public_model_id.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChannelSource for InMemoryChannelStore {
    async fn active_channels_for_model(&self, model: &str) -> Vec<(Channel, ModelMapping)> {
        let channels = self.channels.read().await;
        let mappings = self.mappings.read().await;
        let mut result = Vec::new();
        for channel in channels.values().filter(|c| c.is_active()) {
            if let Some(entries) = mappings.get(&channel.id) {
                for mapping in entries.iter().filter(|m| m.public_model_id == model) {
                    result.push((channel.clone(), mapping.clone()));
                }
            }
        }
        result
    }

    async fn get_channel(&self, channel_id: &str) -> Option<Channel> {
        self.channels.read().await.get(channel_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::channel::{ChannelConfig, ChannelStatus, ProviderKind};

    fn channel(id: &str, status: ChannelStatus) -> Channel {
        Channel {
            id: id.to_string(),
            provider_kind: ProviderKind::OpenAi,
            config: ChannelConfig { api_key: "k".into(), ..Default::default() },
            weight: 1,
            priority: 0,
            status,
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

    #[tokio::test]
    async fn inactive_channels_excluded_from_lookup() {
        let store = InMemoryChannelStore::new();
        store.upsert_channel(channel("c1", ChannelStatus::Inactive), vec![mapping("c1", "gpt-4")]).await;
        assert!(store.active_channels_for_model("gpt-4").await.is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_prior_mappings_entirely() {
        let store = InMemoryChannelStore::new();
        store
            .upsert_channel(channel("c1", ChannelStatus::Active), vec![mapping("c1", "gpt-4"), mapping("c1", "gpt-3.5-turbo")])
            .await;
        store.upsert_channel(channel("c1", ChannelStatus::Active), vec![mapping("c1", "gpt-4")]).await;

        assert_eq!(store.active_channels_for_model("gpt-4").await.len(), 1);
        assert!(store.active_channels_for_model("gpt-3.5-turbo").await.is_empty());
    }

    #[tokio::test]
    async fn remove_channel_drops_its_mappings() {
        let store = InMemoryChannelStore::new();
        store.upsert_channel(channel("c1", ChannelStatus::Active), vec![mapping("c1", "gpt-4")]).await;
        store.remove_channel("c1").await;
        assert!(store.active_channels_for_model("gpt-4").await.is_empty());
        assert!(store.get_channel("c1").await.is_none());
    }
}
