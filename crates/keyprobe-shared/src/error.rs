//! Error types for keyprobe

use crate::types::ProviderId;
use thiserror::Error;

/// Main error type for keyprobe operations
#[derive(Debug, Error)]
pub enum KeyprobeError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Authentication failed for {provider}: {message}")]
    Authentication { provider: ProviderId, message: String },

    #[error("Network error talking to {provider}: {message}")]
    Network { provider: ProviderId, message: String },

    #[error("{provider} API error: {message}")]
    Provider {
        provider: ProviderId,
        status: Option<u16>,
        message: String,
    },
}

/// Result type alias for keyprobe operations
pub type Result<T> = std::result::Result<T, KeyprobeError>;

/// Coarse classification shown to the user next to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthError,
    NetworkError,
    ProviderError,
    ConfigError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::AuthError => write!(f, "AuthError"),
            ErrorKind::NetworkError => write!(f, "NetworkError"),
            ErrorKind::ProviderError => write!(f, "ProviderError"),
            ErrorKind::ConfigError => write!(f, "ConfigError"),
        }
    }
}

impl KeyprobeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeyprobeError::Config { .. } => ErrorKind::ConfigError,
            KeyprobeError::Authentication { .. } => ErrorKind::AuthError,
            KeyprobeError::Network { .. } => ErrorKind::NetworkError,
            KeyprobeError::Provider { .. } => ErrorKind::ProviderError,
        }
    }

    /// Map a non-2xx HTTP response onto an error kind.
    ///
    /// 401 and 403 mean the key was rejected; everything else, rate limits
    /// included, is reported as a provider error carrying the vendor's message.
    pub fn from_status(provider: ProviderId, status: u16, body: &str) -> Self {
        let detail = extract_error_message(body).unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                "no details".to_string()
            } else {
                body.chars().take(200).collect()
            }
        });

        match status {
            401 | 403 => KeyprobeError::Authentication {
                provider,
                message: detail,
            },
            429 => KeyprobeError::Provider {
                provider,
                status: Some(status),
                message: format!("rate limit exceeded: {}", detail),
            },
            _ => KeyprobeError::Provider {
                provider,
                status: Some(status),
                message: format!("HTTP {}: {}", status, detail),
            },
        }
    }

    /// Classify a transport-level failure from the HTTP client
    pub fn from_reqwest(provider: ProviderId, error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(provider, status.as_u16(), "");
        }

        if error.is_decode() {
            KeyprobeError::Provider {
                provider,
                status: None,
                message: format!("malformed response: {}", error),
            }
        } else {
            KeyprobeError::Network {
                provider,
                message: error.to_string(),
            }
        }
    }

    /// Shorthand for a response that parsed but did not have the expected shape
    pub fn unexpected(provider: ProviderId, message: impl Into<String>) -> Self {
        KeyprobeError::Provider {
            provider,
            status: None,
            message: message.into(),
        }
    }
}

/// Pull the human readable message out of a vendor error body.
///
/// OpenAI, Anthropic and Gemini all answer with `{"error": {"message": ...}}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value.pointer("/error/message")?.as_str()?.trim();

    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown provider: {name}")]
    UnknownProvider { name: String },

    #[error("API key not provided for {provider}. Set {env_var} in .env or use --api-key")]
    MissingApiKey { provider: ProviderId, env_var: String },
}

impl From<ConfigError> for KeyprobeError {
    fn from(error: ConfigError) -> Self {
        KeyprobeError::Config {
            message: error.to_string(),
        }
    }
}
