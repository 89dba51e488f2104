//! Cohere adapter. Cohere's `/compatibility/v1/chat/completions` endpoint
//! speaks the OpenAI chat shape, so — like [`crate::providers::mistral`] —
//! this reuses the OpenAI request/response types with Cohere's own base url
//! and bearer auth.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

use crate::channel::{Channel, ProviderKind};
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, NormalizedDelta, StreamChunk};
use crate::providers::http_client::map_error_response;
use crate::providers::{ChatStream, UpstreamAdapter};

pub struct CohereAdapter {
    http: Client,
}

impl CohereAdapter {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    fn url(&self, channel: &Channel) -> String {
        let base = channel.config.api_base_or_default(ProviderKind::Cohere);
        format!("{}/compatibility/v1/chat/completions", base.trim_end_matches('/'))
    }
}

impl Default for CohereAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamAdapter for CohereAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Cohere
    }

    async fn chat_completion(
        &self,
        request: &ChatRequest,
        upstream_model: &str,
        channel: &Channel,
    ) -> Result<ChatResponse, ProviderError> {
        let mut body = request.clone();
        body.model = upstream_model.to_string();
        body.stream = Some(false);

        let resp = self
            .http
            .post(self.url(channel))
            .bearer_auth(&channel.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<ChatResponse>().await?)
    }

    async fn stream_chat_completion(
        &self,
        request: &ChatRequest,
        upstream_model: &str,
        channel: &Channel,
    ) -> Result<ChatStream, ProviderError> {
        let mut body = request.clone();
        body.model = upstream_model.to_string();
        body.stream = Some(true);

        let resp = self
            .http
            .post(self.url(channel))
            .bearer_auth(&channel.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }

        let stream = Box::pin(stream! {
            let mut bytes_stream = resp.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = bytes_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!("cohere stream error: {e}");
                        yield Err(ProviderError::Http(e));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    let Some(json_str) = line.strip_prefix("data: ") else { continue };
                    if json_str == "[DONE]" {
                        return;
                    }

                    match serde_json::from_str::<StreamChunk>(json_str) {
                        Ok(chunk) => {
                            let choice = chunk.choices.into_iter().next();
                            yield Ok(NormalizedDelta {
                                role: choice.as_ref().and_then(|c| c.delta.role),
                                content: choice.as_ref().and_then(|c| c.delta.content.clone()),
                                finish_reason: choice.and_then(|c| c.finish_reason),
                            });
                        }
                        Err(e) => yield Err(ProviderError::Serialization(e)),
                    }
                }
            }
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_targets_cohere() {
        let adapter = CohereAdapter::new();
        let channel = crate::channel::test_support::channel("c1", ProviderKind::Cohere, None);
        assert_eq!(
            adapter.url(&channel),
            "https://api.cohere.com/compatibility/v1/chat/completions"
        );
    }
}
