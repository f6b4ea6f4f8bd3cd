//! Provider Implementations
//!
//! One adapter per vendor API. Each implements the LlmProvider trait and
//! converts vendor payloads into the shared types before returning.

pub mod anthropic;
pub mod gemini;
pub mod openai;

// Re-export provider implementations
pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;

use crate::ai::LlmProvider;
use keyprobe_shared::{KeyprobeError, ProviderConfig, ProviderId, Result};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, warn};

/// Type alias for boxed provider
pub type BoxedProvider = Box<dyn LlmProvider>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider factory for creating providers from configuration
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider from its resolved configuration
    pub fn create_provider(id: ProviderId, config: &ProviderConfig) -> Result<BoxedProvider> {
        let client = http_client()?;

        debug!(
            "Creating {} provider (base url: {})",
            id,
            config.base_url.as_deref().unwrap_or("default")
        );

        let provider: BoxedProvider = match id {
            ProviderId::OpenAI => Box::new(OpenAIProvider::with_client(client, config)),
            ProviderId::Anthropic => Box::new(AnthropicProvider::with_client(client, config)),
            ProviderId::Gemini => Box::new(GeminiProvider::with_client(client, config)),
        };

        Ok(provider)
    }
}

/// HTTP client shared by all adapters
pub fn http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("keyprobe/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| KeyprobeError::Config {
            message: format!("failed to build HTTP client: {}", e),
        })
}

/// Send a request and turn transport failures and non-2xx statuses into errors
pub(crate) async fn send(provider: ProviderId, request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(|e| {
        warn!("{} request failed: {}", provider, e);
        KeyprobeError::from_reqwest(provider, e)
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("{} API error ({}): {}", provider, status, body);

    Err(KeyprobeError::from_status(provider, status.as_u16(), &body))
}

/// Decode a successful JSON response body
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    provider: ProviderId,
    response: Response,
) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| KeyprobeError::from_reqwest(provider, e))
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
