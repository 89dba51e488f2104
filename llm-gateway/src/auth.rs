//! # Caller Authentication
//!
//! Credential storage and issuance are out of scope for this gateway (spec
//! §1) — callers arrive pre-authenticated as an opaque bearer token and this
//! module's only job is turning that token into a [`CallerCredential`] or
//! rejecting it. Everything downstream (model allow-list, budget) reads the
//! resolved credential; nothing downstream re-parses the header.
//!
//! ## API key wire format
//!
//! Opaque bearer tokens with a mandatory prefix `sk-llmweaver-` followed by
//! 32 random alphanumeric characters. Only the hash is ever stored;
//! [`mask_api_key`] is what an admin listing shows back to a human.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use gateway_core::CallerCredential;

pub const API_KEY_PREFIX: &str = "sk-llmweaver-";
const RANDOM_SUFFIX_LEN: usize = 32;

/// Generate a new caller-facing API key. The admin plane is out of this
/// crate's scope, but tests and local bootstrapping need a way to mint one.
pub fn generate_api_key() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{API_KEY_PREFIX}{suffix}")
}

/// SHA-256 hex digest of a presented key. This, not the key itself, is what
/// gets compared against stored credentials.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Render a hash for display: prefix, a masked middle, and the hash's last
/// four characters — never the key itself.
pub fn mask_api_key(hash: &str) -> String {
    let tail = if hash.len() >= 4 { &hash[hash.len() - 4..] } else { hash };
    format!("{API_KEY_PREFIX}****…{tail}")
}

pub fn well_formed(key: &str) -> bool {
    key.strip_prefix(API_KEY_PREFIX)
        .is_some_and(|suffix| suffix.len() == RANDOM_SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// External collaborator seam (spec §4.4 step 1): given a bearer credential,
/// resolve it to a [`CallerCredential`] or reject it. A real deployment
/// backs this with a database lookup by key hash; nothing in the routing
/// pipeline depends on how.
#[async_trait]
pub trait CallerSource: Send + Sync {
    async fn authenticate(&self, presented_key: &str) -> Option<CallerCredential>;

    /// Atomically add `amount` to the caller's `budget_used`. Per spec §5,
    /// concurrent increments from the same caller must never be lost even
    /// if a race briefly lets `budget_used` exceed `budget_limit`.
    async fn add_budget_used(&self, caller_id: &str, amount: f64);
}

/// In-process caller table keyed by key hash. Adequate for local running and
/// integration tests; a multi-instance deployment would swap this for a
/// database-backed `CallerSource` without touching the routing pipeline.
#[derive(Default)]
pub struct InMemoryCallerStore {
    by_hash: RwLock<HashMap<String, CallerCredential>>,
}

impl InMemoryCallerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, presented_key: &str, credential: CallerCredential) {
        self.by_hash.write().await.insert(hash_api_key(presented_key), credential);
    }
}

#[async_trait]
impl CallerSource for InMemoryCallerStore {
    async fn authenticate(&self, presented_key: &str) -> Option<CallerCredential> {
        if !well_formed(presented_key) {
            return None;
        }
        self.by_hash.read().await.get(&hash_api_key(presented_key)).cloned()
    }

    async fn add_budget_used(&self, caller_id: &str, amount: f64) {
        let mut table = self.by_hash.write().await;
        if let Some(credential) = table.values_mut().find(|c| c.id == caller_id) {
            credential.budget_used += amount;
        }
    }
}

/// Pull the bearer token out of an `Authorization: Bearer <token>` header
/// value.
pub fn extract_bearer_token(header_value: Option<&str>) -> Option<&str> {
    header_value?.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::channel::CallerStatus;

    fn caller(id: &str) -> CallerCredential {
        CallerCredential {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            allowed_models: None,
            budget_limit: 10.0,
            budget_used: 0.0,
            status: CallerStatus::Active,
        }
    }

    #[test]
    fn generated_keys_are_well_formed() {
        let key = generate_api_key();
        assert!(well_formed(&key));
    }

    #[test]
    fn mask_reveals_only_prefix_and_last_four() {
        let hash = hash_api_key("sk-llmweaver-abcdefghijklmnopqrstuvwxyz012345");
        let masked = mask_api_key(&hash);
        assert!(masked.starts_with(API_KEY_PREFIX));
        assert!(masked.ends_with(&hash[hash.len() - 4..]));
        assert!(!masked.contains(&hash[..hash.len() - 4]));
    }

    #[tokio::test]
    async fn authenticate_rejects_malformed_key() {
        let store = InMemoryCallerStore::new();
        assert!(store.authenticate("not-a-real-key").await.is_none());
    }

    #[tokio::test]
    async fn authenticate_resolves_inserted_credential() {
        let store = InMemoryCallerStore::new();
        let key = generate_api_key();
        store.insert(&key, caller("c1")).await;
        let resolved = store.authenticate(&key).await.unwrap();
        assert_eq!(resolved.id, "c1");
    }

    #[tokio::test]
    async fn add_budget_used_accumulates() {
        let store = InMemoryCallerStore::new();
        let key = generate_api_key();
        store.insert(&key, caller("c1")).await;
        store.add_budget_used("c1", 0.5).await;
        store.add_budget_used("c1", 0.25).await;
        let resolved = store.authenticate(&key).await.unwrap();
        assert_eq!(resolved.budget_used, 0.75);
    }
}
