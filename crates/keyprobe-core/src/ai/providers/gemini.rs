//! Gemini Provider Implementation
//!
//! Google's Generative Language API. Model ids may be given with or without
//! the `models/` prefix the API uses in its listings.

use super::{endpoint, read_json, send};
use crate::ai::streaming::{
    decode_sse, parse_event_json, text_stream, ChatStream, StreamControl, StreamUtils,
};
use crate::ai::{LlmProvider, SseEvent};
use async_trait::async_trait;
use futures::StreamExt;
use keyprobe_shared::{KeyprobeError, ModelInfo, ProviderConfig, ProviderId, Result};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Default endpoint for the Gemini API
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PAGE_SIZE: &str = "1000";

const ID: ProviderId = ProviderId::Gemini;

/// Gemini provider
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

/// One page of `GET /models`
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ModelsPage {
    #[serde(default)]
    models: Vec<GeminiModel>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Request payload for `streamGenerateContent`
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize, Debug)]
struct Part<'a> {
    text: &'a str,
}

/// One streamed `GenerateContentResponse`
#[derive(Deserialize, Debug)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiProvider {
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
        request.header("x-goog-api-key", &self.api_key)
    }

    /// Gemini answers a bad key with 400 INVALID_ARGUMENT rather than 401
    fn reclassify(error: KeyprobeError) -> KeyprobeError {
        match error {
            KeyprobeError::Provider {
                status: Some(400),
                message,
                ..
            } if message.contains("API key not valid") || message.contains("API_KEY_INVALID") => {
                KeyprobeError::Authentication {
                    provider: ID,
                    message,
                }
            }
            other => other,
        }
    }

    fn convert_model(model: GeminiModel) -> ModelInfo {
        let mut info = ModelInfo::new(model.name);
        info.name = model.display_name;
        info.description = model.description.filter(|d| !d.is_empty());
        info
    }

    fn interpret(event: &SseEvent) -> Result<StreamControl> {
        let chunk: GenerateChunk = parse_event_json(ID, &event.data)?;

        let text: String = chunk
            .candidates
            .into_iter()
            .take(1)
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect();

        Ok(if text.is_empty() {
            StreamControl::Skip
        } else {
            StreamControl::Text(text)
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    #[instrument(skip(self))]
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = endpoint(&self.base_url, "models");
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            debug!("Listing models from {} (page token: {:?})", url, page_token);

            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let request = self.authorized(self.client.get(&url).query(&query));
            let response = send(ID, request).await.map_err(Self::reclassify)?;
            let page: ModelsPage = read_json(ID, response).await?;

            models.extend(
                page.models
                    .into_iter()
                    .filter(|model| !model.name.is_empty())
                    .map(Self::convert_model),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if page_token.as_deref() == Some(token.as_str()) {
                        warn!("Gemini repeated page token {}, stopping", token);
                        break;
                    }
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(models)
    }

    #[instrument(skip(self, message, system_prompt))]
    async fn chat(&self, message: &str, model: &str, system_prompt: &str) -> Result<ChatStream> {
        let model = model.trim_start_matches("models/");
        if model.is_empty() {
            return Err(KeyprobeError::Config {
                message: "no model given for Gemini chat".to_string(),
            });
        }

        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: message }],
            }],
            system_instruction: Some(system_prompt)
                .filter(|s| !s.is_empty())
                .map(|text| Content {
                    role: None,
                    parts: vec![Part { text }],
                }),
        };

        let url = endpoint(
            &self.base_url,
            &format!("models/{}:streamGenerateContent", model),
        );
        debug!("Starting streaming chat request to {}", url);

        let request = self.authorized(self.client.post(&url).query(&[("alt", "sse")]).json(&body));
        let response = send(ID, request).await.map_err(Self::reclassify)?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| KeyprobeError::from_reqwest(ID, e)));
        let stream = text_stream(decode_sse(bytes), Self::interpret);

        Ok(StreamUtils::with_logging(stream, "gemini"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_interpret_candidate_parts() {
        let control = GeminiProvider::interpret(&event(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"},"index":0}],"modelVersion":"gemini-2.0-flash"}"#,
        ))
        .unwrap();

        assert_eq!(control, StreamControl::Text("Hello".to_string()));
    }

    #[test]
    fn test_interpret_finish_without_text() {
        let control = GeminiProvider::interpret(&event(
            r#"{"candidates":[{"finishReason":"STOP","index":0}],"usageMetadata":{"totalTokenCount":12}}"#,
        ))
        .unwrap();

        assert_eq!(control, StreamControl::Skip);
    }

    #[test]
    fn test_invalid_key_is_authentication_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let err = GeminiProvider::reclassify(KeyprobeError::from_status(ID, 400, body));

        assert_eq!(err.kind(), keyprobe_shared::ErrorKind::AuthError);
    }

    #[test]
    fn test_other_bad_requests_stay_provider_errors() {
        let body = r#"{"error":{"code":400,"message":"Invalid JSON payload","status":"INVALID_ARGUMENT"}}"#;
        let err = GeminiProvider::reclassify(KeyprobeError::from_status(ID, 400, body));

        assert_eq!(err.kind(), keyprobe_shared::ErrorKind::ProviderError);
    }

    #[test]
    fn test_convert_model() {
        let info = GeminiProvider::convert_model(GeminiModel {
            name: "models/gemini-2.0-flash".to_string(),
            display_name: Some("Gemini 2.0 Flash".to_string()),
            description: Some(String::new()),
        });

        assert_eq!(info.id, "models/gemini-2.0-flash");
        assert_eq!(info.name.as_deref(), Some("Gemini 2.0 Flash"));
        assert!(info.description.is_none());
    }
}
