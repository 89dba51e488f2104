//! Anthropic adapter. Diverges furthest from the OpenAI shape: system
//! messages ride a top-level `system` field rather than a `messages` entry,
//! token usage fields are named `input_tokens`/`output_tokens`, and stream
//! events are a multi-type SSE protocol (`content_block_delta`,
//! `message_stop`, ...) rather than one uniform chunk shape.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::channel::{Channel, ProviderKind};
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, Message, NormalizedDelta, Role, Usage};
use crate::providers::http_client::map_error_response;
use crate::providers::{ChatStream, UpstreamAdapter};

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// `max_tokens` -> `length`, `stop_sequence` -> `stop`, everything else
/// passed through unchanged.
fn map_stop_reason(reason: Option<String>) -> Option<String> {
    reason.map(|r| match r.as_str() {
        "max_tokens" => "length".to_string(),
        "stop_sequence" => "stop".to_string(),
        other => other.to_string(),
    })
}

/// Anthropic keeps `system` separate from `messages`; multiple system
/// messages in the request are joined with newlines into one system block.
fn split_system(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system = String::new();
    let mut rest = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                if !system.is_empty() {
                    system.push('\n');
                }
                system.push_str(&msg.content);
            }
            Role::User => rest.push(AnthropicMessage {
                role: "user".to_string(),
                content: msg.content.clone(),
            }),
            Role::Assistant => rest.push(AnthropicMessage {
                role: "assistant".to_string(),
                content: msg.content.clone(),
            }),
        }
    }

    (if system.is_empty() { None } else { Some(system) }, rest)
}

pub struct AnthropicAdapter {
    http: Client,
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    fn url(&self, channel: &Channel) -> String {
        let base = channel.config.api_base_or_default(ProviderKind::Anthropic);
        format!("{}/v1/messages", base.trim_end_matches('/'))
    }

    fn build_request(&self, request: &ChatRequest, upstream_model: &str, stream: bool) -> AnthropicRequest {
        let (system, messages) = split_system(&request.messages);
        AnthropicRequest {
            model: upstream_model.to_string(),
            max_tokens: request.max_tokens.unwrap_or(4096),
            messages,
            system,
            temperature: request.temperature,
            stream: Some(stream),
        }
    }
}

impl Default for AnthropicAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamAdapter for AnthropicAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn chat_completion(
        &self,
        request: &ChatRequest,
        upstream_model: &str,
        channel: &Channel,
    ) -> Result<ChatResponse, ProviderError> {
        let body = self.build_request(request, upstream_model, false);
        let api_version = channel.config.api_version_or_default(ProviderKind::Anthropic);

        let resp = self
            .http
            .post(self.url(channel))
            .header("x-api-key", &channel.config.api_key)
            .header("anthropic-version", api_version)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }

        let parsed: AnthropicResponse = resp.json().await?;
        let content = parsed
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse::new(
            parsed.id,
            parsed.model,
            Message::assistant(content),
            map_stop_reason(parsed.stop_reason),
            Usage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
        ))
    }

    async fn stream_chat_completion(
        &self,
        request: &ChatRequest,
        upstream_model: &str,
        channel: &Channel,
    ) -> Result<ChatStream, ProviderError> {
        let body = self.build_request(request, upstream_model, true);
        let api_version = channel.config.api_version_or_default(ProviderKind::Anthropic);

        let resp = self
            .http
            .post(self.url(channel))
            .header("x-api-key", &channel.config.api_key)
            .header("anthropic-version", api_version)
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
                        tracing::warn!("anthropic stream error: {e}");
                        yield Err(ProviderError::Http(e));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    let Some(json_str) = line.strip_prefix("data: ") else { continue };

                    let event: serde_json::Value = match serde_json::from_str(json_str) {
                        Ok(v) => v,
                        Err(e) => {
                            yield Err(ProviderError::Serialization(e));
                            continue;
                        }
                    };

                    match event.get("type").and_then(|t| t.as_str()) {
                        Some("content_block_delta") => {
                            if let Some(text) = event
                                .get("delta")
                                .and_then(|d| d.get("text"))
                                .and_then(|t| t.as_str())
                            {
                                yield Ok(NormalizedDelta {
                                    role: None,
                                    content: Some(text.to_string()),
                                    finish_reason: None,
                                });
                            }
                        }
                        Some("message_delta") => {
                            let stop_reason = event
                                .get("delta")
                                .and_then(|d| d.get("stop_reason"))
                                .and_then(|r| r.as_str())
                                .map(|s| s.to_string());
                            if let Some(reason) = stop_reason {
                                yield Ok(NormalizedDelta {
                                    role: None,
                                    content: None,
                                    finish_reason: map_stop_reason(Some(reason)),
                                });
                            }
                        }
                        Some("message_stop") => return,
                        _ => {}
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
    use crate::models::Message;

    #[test]
    fn system_messages_merge_into_top_level_field() {
        let messages = vec![
            Message::system("be terse"),
            Message::system("never lie"),
            Message::user("hi"),
        ];
        let (system, rest) = split_system(&messages);
        assert_eq!(system, Some("be terse\nnever lie".to_string()));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].role, "user");
    }

    #[test]
    fn no_system_messages_yields_none() {
        let messages = vec![Message::user("hi")];
        let (system, rest) = split_system(&messages);
        assert_eq!(system, None);
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(map_stop_reason(Some("max_tokens".into())), Some("length".into()));
        assert_eq!(map_stop_reason(Some("stop_sequence".into())), Some("stop".into()));
        assert_eq!(map_stop_reason(Some("end_turn".into())), Some("end_turn".into()));
        assert_eq!(map_stop_reason(None), None);
    }
}
