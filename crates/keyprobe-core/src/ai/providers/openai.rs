//! OpenAI Provider Implementation
//!
//! Talks to the Chat Completions API. Any OpenAI-compatible server can be
//! targeted through a custom base URL.

use super::{endpoint, read_json, send};
use crate::ai::streaming::{
    decode_sse, parse_event_json, text_stream, ChatStream, StreamControl, StreamUtils,
};
use crate::ai::LlmProvider;
use async_trait::async_trait;
use futures::StreamExt;
use keyprobe_shared::{KeyprobeError, ModelInfo, ProviderConfig, ProviderId, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Default endpoint for the OpenAI API
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const ID: ProviderId = ProviderId::OpenAI;

/// OpenAI provider
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

/// Response from `GET /models`
#[derive(Deserialize, Debug)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<OpenAIModel>,
}

#[derive(Deserialize, Debug)]
struct OpenAIModel {
    id: String,
    #[serde(default)]
    created: Option<i64>,
}

/// Request payload for `POST /chat/completions`
#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// One `data:` payload of a streamed completion
#[derive(Deserialize, Debug)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Debug, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self::with_client(super::http_client()?, config))
    }

    pub fn with_client(client: Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn interpret(event: &crate::ai::SseEvent) -> Result<StreamControl> {
        if event.data.trim() == "[DONE]" {
            return Ok(StreamControl::Done);
        }

        let chunk: ChatChunk = parse_event_json(ID, &event.data)?;
        let text: String = chunk
            .choices
            .into_iter()
            .filter_map(|choice| choice.delta.content)
            .collect();

        Ok(if text.is_empty() {
            StreamControl::Skip
        } else {
            StreamControl::Text(text)
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    #[instrument(skip(self))]
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = endpoint(&self.base_url, "models");
        debug!("Listing models from {}", url);

        let request = self.client.get(&url).bearer_auth(&self.api_key);
        let response: ModelsResponse = read_json(ID, send(ID, request).await?).await?;

        Ok(response
            .data
            .into_iter()
            .filter(|model| !model.id.is_empty())
            .map(|model| {
                let info = ModelInfo::new(model.id.clone()).with_name(model.id);
                match model.created {
                    Some(created) => info.with_created(created),
                    None => info,
                }
            })
            .collect())
    }

    #[instrument(skip(self, message, system_prompt))]
    async fn chat(&self, message: &str, model: &str, system_prompt: &str) -> Result<ChatStream> {
        if model.is_empty() {
            return Err(KeyprobeError::Config {
                message: "no model given for OpenAI chat".to_string(),
            });
        }

        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: message,
        });

        let body = ChatRequest {
            model,
            messages,
            stream: true,
        };

        let url = endpoint(&self.base_url, "chat/completions");
        debug!("Starting streaming chat request to {}", url);

        let request = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        let response = send(ID, request).await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| KeyprobeError::from_reqwest(ID, e)));
        let stream = text_stream(decode_sse(bytes), Self::interpret);

        Ok(StreamUtils::with_logging(stream, "openai"))
    }
}
