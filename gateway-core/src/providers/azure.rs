//! Azure OpenAI adapter. Same wire body as [`crate::providers::openai`], but
//! the url is keyed by deployment name rather than model, auth is an
//! `api-key` header rather than a bearer token, and the api version rides
//! in the query string.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

use crate::channel::{Channel, ProviderKind};
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, NormalizedDelta, StreamChunk};
use crate::providers::http_client::map_error_response;
use crate::providers::{ChatStream, UpstreamAdapter};

pub struct AzureAdapter {
    http: Client,
}

impl AzureAdapter {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    fn url(&self, channel: &Channel, deployment: &str, path: &str) -> String {
        let base = channel.config.api_base_or_default(ProviderKind::Azure);
        let api_version = channel.config.api_version_or_default(ProviderKind::Azure);
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            base.trim_end_matches('/'),
            deployment,
            path,
            api_version
        )
    }
}

impl Default for AzureAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamAdapter for AzureAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Azure
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
            .post(self.url(channel, upstream_model, "chat/completions"))
            .header("api-key", &channel.config.api_key)
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
            .post(self.url(channel, upstream_model, "chat/completions"))
            .header("api-key", &channel.config.api_key)
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
                        tracing::warn!("azure stream error: {e}");
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
    fn url_carries_deployment_and_api_version() {
        let adapter = AzureAdapter::new();
        let mut channel = crate::channel::test_support::channel(
            "c1",
            ProviderKind::Azure,
            Some("https://my-resource.openai.azure.com".to_string()),
        );
        channel.config.api_version = Some("2024-06-01".to_string());
        assert_eq!(
            adapter.url(&channel, "gpt-4-deploy", "chat/completions"),
            "https://my-resource.openai.azure.com/openai/deployments/gpt-4-deploy/chat/completions?api-version=2024-06-01"
        );
    }
}
