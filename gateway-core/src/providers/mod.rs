//! Upstream protocol adapters (spec §4.3).
//!
//! One adapter exists per provider *kind*, not per channel — many channels
//! of the same kind (different api keys, different base urls) share a
//! single adapter instance, with per-call parameters (`channel`,
//! `upstream_model`) carrying the per-channel configuration. Each adapter
//! implements the same four-operation contract: build the unary request,
//! parse the unary response, build the stream request, parse each stream
//! chunk — normalizing everything into the OpenAI shapes in
//! [`crate::models`].

pub mod anthropic;
pub mod azure;
pub mod cohere;
pub mod gemini;
pub mod http_client;
pub mod mistral;
pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::channel::{Channel, ProviderKind};
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, NormalizedDelta};

/// A provider's normalized streaming output: one item per upstream chunk,
/// terminated by the stream simply ending (the routing pipeline is
/// responsible for framing the trailing `data: [DONE]`).
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<NormalizedDelta, ProviderError>> + Send>>;

/// The common capability set every upstream provider kind implements.
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    fn provider_kind(&self) -> ProviderKind;

    /// Build + send the unary request, returning the normalized completion.
    async fn chat_completion(
        &self,
        request: &ChatRequest,
        upstream_model: &str,
        channel: &Channel,
    ) -> Result<ChatResponse, ProviderError>;

    /// Build + send the streaming request, returning a stream of normalized
    /// deltas. The HTTP connection stays open for the lifetime of the
    /// returned stream; dropping it cancels the upstream call.
    async fn stream_chat_completion(
        &self,
        request: &ChatRequest,
        upstream_model: &str,
        channel: &Channel,
    ) -> Result<ChatStream, ProviderError>;
}

/// Construct the adapter for `kind`. Gateway startup builds one of each and
/// keeps them alive for the process lifetime; adapters hold no per-channel
/// state.
pub fn create_adapter(kind: ProviderKind) -> Box<dyn UpstreamAdapter> {
    match kind {
        ProviderKind::OpenAi => Box::new(openai::OpenAiAdapter::new()),
        ProviderKind::Azure => Box::new(azure::AzureAdapter::new()),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicAdapter::new()),
        ProviderKind::Gemini => Box::new(gemini::GeminiAdapter::new()),
        ProviderKind::Mistral => Box::new(mistral::MistralAdapter::new()),
        ProviderKind::Cohere => Box::new(cohere::CohereAdapter::new()),
    }
}
