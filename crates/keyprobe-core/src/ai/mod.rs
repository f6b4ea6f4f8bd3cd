//! Provider abstraction
//!
//! This module provides the provider-neutral surface of keyprobe:
//! - The abstract [`LlmProvider`] interface
//! - One implementation per vendor (OpenAI, Anthropic, Gemini)
//! - Server-Sent Events decoding for streamed chat replies

pub mod providers;
pub mod streaming;

// Re-export main types
pub use providers::{AnthropicProvider, GeminiProvider, OpenAIProvider};
pub use streaming::{ChatStream, SseEvent};

use async_trait::async_trait;
use keyprobe_shared::{ModelInfo, ProviderId, Result, ValidationResult};
use tracing::warn;

/// Abstract trait for all AI providers
///
/// Vendor payloads never leave the implementations: everything crossing this
/// boundary is a [`ModelInfo`], a [`ValidationResult`] or plain text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider identifier
    fn id(&self) -> ProviderId;

    /// List every model the configured key can see
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Check whether the configured key is accepted.
    ///
    /// Never fails: any error is folded into a negative result.
    async fn validate(&self) -> ValidationResult {
        match self.list_models().await {
            Ok(models) => ValidationResult::valid(format!(
                "API key is valid ({} models available)",
                models.len()
            )),
            Err(e) => {
                warn!("{} key validation failed: {}", self.id(), e);
                ValidationResult::invalid(e.to_string())
            }
        }
    }

    /// Open a streaming chat completion for a single user message
    async fn chat(&self, message: &str, model: &str, system_prompt: &str) -> Result<ChatStream>;
}
