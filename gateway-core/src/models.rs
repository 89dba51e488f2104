//! OpenAI-compatible wire types.
//!
//! This is the single shape every adapter normalizes into and every client
//! request is already in: the gateway's external contract (spec §6) and the
//! adapters' internal contract (spec §4.3) are the same types.
//!
//! Trimmed from the richer upstream SDK this crate started from — no tool
//! calling, embeddings, image, or audio types, since none of those are part
//! of the chat-completions-only surface this gateway exposes.

use serde::{Deserialize, Serialize};

/// `POST /v1/chat/completions` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl ChatRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// Non-streaming `chat.completion` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    pub fn new(id: String, model: String, message: Message, finish_reason: Option<String>, usage: Usage) -> Self {
        Self {
            id,
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model,
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason,
            }],
            usage: Some(usage),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// `tokens := floor(len(text)/3) + 1`, the fallback heuristic for
    /// upstreams that omit token counts (spec §4.3).
    pub fn estimate_tokens(text: &str) -> u32 {
        (text.len() / 3) as u32 + 1
    }
}

/// One `text/event-stream` chunk, `chat.completion.chunk` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A single normalized streaming delta yielded by an adapter, one level
/// below the wire `StreamChunk` so the routing pipeline can accumulate
/// output text for token counting before re-framing it as SSE.
#[derive(Debug, Clone)]
pub struct NormalizedDelta {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub finish_reason: Option<String>,
}

/// `GET /v1/models` entry. `context_window`/`capabilities` are additions
/// beyond the bare OpenAI shape, populated from [`ProviderModel`] when the
/// catalog has an estimate for the model; omitted from the wire format
/// when unknown rather than serialized as null/empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelListResponse {
    pub fn new(models: Vec<ModelInfo>) -> Self {
        Self {
            object: "list".to_string(),
            data: models,
        }
    }
}

/// A model as the catalog discovery side (not the admin CRUD side) sees
/// it: what an upstream offers, independent of any channel mapping. The
/// narrow read interface spec's model catalog discovery boundary allows,
/// populated here by heuristic rather than by querying each upstream's own
/// model-listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderModel {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub channel_type: String,
    pub context_window: Option<u32>,
    pub capabilities: Vec<String>,
    pub description: String,
}

impl ProviderModel {
    pub fn new(id: impl Into<String>, provider: impl Into<String>, channel_type: impl Into<String>) -> Self {
        let id = id.into();
        let capabilities = detect_capabilities(&id);
        let context_window = estimate_context_window(&id);
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            channel_type: channel_type.into(),
            context_window,
            capabilities,
            description: String::new(),
        }
    }
}

impl From<ProviderModel> for ModelInfo {
    fn from(model: ProviderModel) -> Self {
        ModelInfo {
            id: model.id,
            object: "model".to_string(),
            created: 0,
            owned_by: model.provider,
            context_window: model.context_window,
            capabilities: model.capabilities,
        }
    }
}

/// Capability tags inferred from a model id's name. Every model can chat;
/// vision and function-calling support is a keyword match against known
/// model families, not a queried capability.
pub fn detect_capabilities(model_id: &str) -> Vec<String> {
    let lower = model_id.to_lowercase();
    let mut capabilities = vec!["chat".to_string()];

    if ["vision", "gpt-4", "claude-3", "gemini"].iter().any(|kw| lower.contains(kw)) {
        capabilities.push("vision".to_string());
    }
    if ["gpt-4", "gpt-3.5", "claude-3", "claude-3-5"].iter().any(|kw| lower.contains(kw)) {
        capabilities.push("function_calling".to_string());
    }

    capabilities
}

/// Best-effort context window size in tokens, by model family. `None` when
/// the id doesn't match a known family.
pub fn estimate_context_window(model_id: &str) -> Option<u32> {
    let lower = model_id.to_lowercase();

    if lower.contains("gpt-4-turbo") || lower.contains("gpt-4o") {
        Some(128_000)
    } else if lower.contains("gpt-4") && lower.contains("32k") {
        Some(32_768)
    } else if lower.contains("gpt-4") {
        Some(8_192)
    } else if lower.contains("gpt-3.5") && lower.contains("16k") {
        Some(16_384)
    } else if lower.contains("gpt-3.5") {
        Some(4_096)
    } else if lower.contains("claude-3") {
        Some(200_000)
    } else if lower.contains("claude") {
        Some(100_000)
    } else if lower.contains("gemini-1.5-pro") {
        Some(2_000_000)
    } else if lower.contains("gemini-1.5-flash") {
        Some(1_000_000)
    } else if lower.contains("gemini") {
        Some(32_768)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_heuristic() {
        assert_eq!(Usage::estimate_tokens(""), 1);
        assert_eq!(Usage::estimate_tokens("abc"), 2);
        assert_eq!(Usage::estimate_tokens("abcdefghi"), 4);
    }

    #[test]
    fn message_constructors_set_role() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::system("hi").role, Role::System);
        assert_eq!(Message::assistant("hi").role, Role::Assistant);
    }

    #[test]
    fn detect_capabilities_matches_known_families() {
        assert_eq!(detect_capabilities("text-embedding-ada-002"), vec!["chat"]);
        assert_eq!(detect_capabilities("gpt-4-vision-preview"), vec!["chat", "vision", "function_calling"]);
        assert_eq!(detect_capabilities("claude-3-opus"), vec!["chat", "vision", "function_calling"]);
        assert_eq!(detect_capabilities("gemini-1.5-pro"), vec!["chat", "vision"]);
    }

    #[test]
    fn estimate_context_window_matches_known_families() {
        assert_eq!(estimate_context_window("gpt-4o"), Some(128_000));
        assert_eq!(estimate_context_window("gpt-4-32k"), Some(32_768));
        assert_eq!(estimate_context_window("gpt-3.5-turbo-16k"), Some(16_384));
        assert_eq!(estimate_context_window("claude-3-sonnet"), Some(200_000));
        assert_eq!(estimate_context_window("gemini-1.5-flash"), Some(1_000_000));
        assert_eq!(estimate_context_window("some-unknown-model"), None);
    }

    #[test]
    fn provider_model_into_model_info_carries_catalog_fields() {
        let provider_model = ProviderModel::new("gpt-4-turbo", "openai", "openai");
        assert_eq!(provider_model.context_window, Some(128_000));
        assert!(provider_model.capabilities.contains(&"vision".to_string()));

        let info: ModelInfo = provider_model.into();
        assert_eq!(info.id, "gpt-4-turbo");
        assert_eq!(info.owned_by, "openai");
        assert_eq!(info.context_window, Some(128_000));
    }
}
