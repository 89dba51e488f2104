//! Gemini adapter (Google's `generativelanguage.googleapis.com` API).
//! Messages become a `contents[]` array keyed by `user`/`model` roles, a
//! leading system message becomes `systemInstruction`, and generation
//! parameters nest under `generationConfig`. The api key travels as a
//! `?key=` query parameter rather than a header.

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
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "systemInstruction")]
    system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "maxOutputTokens")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "topP")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
    #[serde(rename = "modelVersion")]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

/// `STOP` -> `stop`, `MAX_TOKENS` -> `length`, everything else lowercased.
fn map_finish_reason(reason: Option<String>) -> Option<String> {
    reason.map(|r| match r.as_str() {
        "STOP" => "stop".to_string(),
        "MAX_TOKENS" => "length".to_string(),
        "SAFETY" => "content_filter".to_string(),
        other => other.to_lowercase(),
    })
}

fn build_contents(messages: &[Message]) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system = None;
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                system = Some(GeminiContent {
                    role: None,
                    parts: vec![GeminiPart { text: msg.content.clone() }],
                });
            }
            Role::User => contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart { text: msg.content.clone() }],
            }),
            Role::Assistant => contents.push(GeminiContent {
                role: Some("model".to_string()),
                parts: vec![GeminiPart { text: msg.content.clone() }],
            }),
        }
    }

    (system, contents)
}

pub struct GeminiAdapter {
    http: Client,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    fn build_request(&self, request: &ChatRequest) -> GeminiRequest {
        let (system_instruction, contents) = build_contents(&request.messages);
        GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: Some(request.max_tokens.unwrap_or(8192)),
                top_p: request.top_p,
            },
        }
    }

    fn url(&self, channel: &Channel, upstream_model: &str, method: &str) -> String {
        let base = channel.config.api_base_or_default(ProviderKind::Gemini);
        let version = channel.config.api_version_or_default(ProviderKind::Gemini);
        format!(
            "{}/{}/models/{}:{}?key={}",
            base.trim_end_matches('/'),
            version,
            upstream_model,
            method,
            channel.config.api_key
        )
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamAdapter for GeminiAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn chat_completion(
        &self,
        request: &ChatRequest,
        upstream_model: &str,
        channel: &Channel,
    ) -> Result<ChatResponse, ProviderError> {
        let body = self.build_request(request);
        let resp = self
            .http
            .post(self.url(channel, upstream_model, "generateContent"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }

        let parsed: GeminiResponse = resp.json().await?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "gemini response had no candidates".to_string(),
            })?;

        let text = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        let usage = parsed
            .usage_metadata
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_else(|| Usage::new(Usage::estimate_tokens(""), Usage::estimate_tokens(&text)));

        Ok(ChatResponse::new(
            format!("gemini-{}", uuid::Uuid::new_v4()),
            parsed.model_version.unwrap_or_else(|| upstream_model.to_string()),
            Message::assistant(text),
            map_finish_reason(candidate.finish_reason),
            usage,
        ))
    }

    async fn stream_chat_completion(
        &self,
        request: &ChatRequest,
        upstream_model: &str,
        channel: &Channel,
    ) -> Result<ChatStream, ProviderError> {
        let body = self.build_request(request);
        let mut url = self.url(channel, upstream_model, "streamGenerateContent");
        url.push_str("&alt=sse");

        let resp = self.http.post(url).json(&body).send().await?;
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
                        tracing::warn!("gemini stream error: {e}");
                        yield Err(ProviderError::Http(e));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    let Some(json_str) = line.strip_prefix("data: ") else { continue };

                    match serde_json::from_str::<GeminiResponse>(json_str) {
                        Ok(parsed) => {
                            if let Some(candidate) = parsed.candidates.into_iter().next() {
                                let text = candidate.content.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join("");
                                yield Ok(NormalizedDelta {
                                    role: None,
                                    content: if text.is_empty() { None } else { Some(text) },
                                    finish_reason: map_finish_reason(candidate.finish_reason),
                                });
                            }
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
    fn system_message_becomes_system_instruction() {
        let messages = vec![Message::system("be terse"), Message::user("hi")];
        let (system, contents) = build_contents(&messages);
        assert!(system.is_some());
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        let (_, contents) = build_contents(&messages);
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("STOP".into())), Some("stop".into()));
        assert_eq!(map_finish_reason(Some("MAX_TOKENS".into())), Some("length".into()));
        assert_eq!(map_finish_reason(None), None);
    }
}
