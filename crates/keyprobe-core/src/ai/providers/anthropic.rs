//! Anthropic Provider Implementation
//!
//! Uses the Messages API with Server-Sent Events for streaming and the paged
//! Models API for listing.

use super::{endpoint, read_json, send};
use crate::ai::streaming::{
    decode_sse, parse_event_json, text_stream, ChatStream, StreamControl, StreamUtils,
};
use crate::ai::{LlmProvider, SseEvent};
use async_trait::async_trait;
use chrono::DateTime;
use futures::StreamExt;
use keyprobe_shared::{KeyprobeError, ModelInfo, ProviderConfig, ProviderId, Result};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

/// Default endpoint for the Anthropic API
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Value sent in the `anthropic-version` header
pub const API_VERSION: &str = "2023-06-01";

/// Upper bound on generated tokens; the Messages API requires one
pub const MAX_TOKENS: u32 = 1024;

const PAGE_SIZE: &str = "1000";

const ID: ProviderId = ProviderId::Anthropic;

/// Anthropic provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

/// One page of `GET /models`
#[derive(Deserialize, Debug)]
struct ModelsPage {
    #[serde(default)]
    data: Vec<AnthropicModel>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AnthropicModel {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

/// Request payload for `POST /messages`
#[derive(Serialize, Debug)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Streaming event; only the fields needed to extract text are read
#[derive(Deserialize, Debug)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
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

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }

    fn convert_model(model: AnthropicModel) -> ModelInfo {
        let created = model
            .created_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.timestamp());

        let name = model.display_name.unwrap_or_else(|| model.id.clone());
        let info = ModelInfo::new(model.id).with_name(name);

        match created {
            Some(created) => info.with_created(created),
            None => info,
        }
    }

    fn interpret(event: &SseEvent) -> Result<StreamControl> {
        let parsed: StreamEvent = parse_event_json(ID, &event.data)?;

        match parsed.event_type.as_str() {
            "content_block_delta" => {
                let text = parsed
                    .delta
                    .filter(|d| d.delta_type.as_deref().unwrap_or("text_delta") == "text_delta")
                    .and_then(|d| d.text)
                    .unwrap_or_default();
                Ok(StreamControl::Text(text))
            }
            "message_stop" => Ok(StreamControl::Done),
            other => {
                trace!("Skipping Anthropic event: {}", other);
                Ok(StreamControl::Skip)
            }
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    #[instrument(skip(self))]
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = endpoint(&self.base_url, "models");
        let mut models = Vec::new();
        let mut after_id: Option<String> = None;

        loop {
            debug!("Listing models from {} (after: {:?})", url, after_id);

            let mut query = vec![("limit", PAGE_SIZE.to_string())];
            if let Some(after) = &after_id {
                query.push(("after_id", after.clone()));
            }

            let request = self.authorized(self.client.get(&url).query(&query));
            let page: ModelsPage = read_json(ID, send(ID, request).await?).await?;

            models.extend(
                page.data
                    .into_iter()
                    .filter(|model| !model.id.is_empty())
                    .map(Self::convert_model),
            );

            match page.last_id {
                Some(last_id) if page.has_more => {
                    if after_id.as_deref() == Some(last_id.as_str()) {
                        warn!("Anthropic repeated page cursor {}, stopping", last_id);
                        break;
                    }
                    after_id = Some(last_id);
                }
                _ => break,
            }
        }

        Ok(models)
    }

    #[instrument(skip(self, message, system_prompt))]
    async fn chat(&self, message: &str, model: &str, system_prompt: &str) -> Result<ChatStream> {
        if model.is_empty() {
            return Err(KeyprobeError::Config {
                message: "no model given for Anthropic chat".to_string(),
            });
        }

        let body = MessagesRequest {
            model,
            max_tokens: MAX_TOKENS,
            system: Some(system_prompt).filter(|s| !s.is_empty()),
            messages: vec![AnthropicMessage {
                role: "user",
                content: message,
            }],
            stream: true,
        };

        let url = endpoint(&self.base_url, "messages");
        debug!("Starting streaming chat request to {}", url);

        let request = self.authorized(self.client.post(&url).json(&body));
        let response = send(ID, request).await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| KeyprobeError::from_reqwest(ID, e)));
        let stream = text_stream(decode_sse(bytes), Self::interpret);

        Ok(StreamUtils::with_logging(stream, "anthropic"))
    }
}
