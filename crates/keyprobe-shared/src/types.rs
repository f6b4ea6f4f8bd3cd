//! Core types used throughout keyprobe

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// AI provider identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    Anthropic,
    Gemini,
}

impl ProviderId {
    /// Every supported provider, in the order `chat` fans out to them
    pub const ALL: [ProviderId; 3] = [ProviderId::OpenAI, ProviderId::Anthropic, ProviderId::Gemini];

    /// Lowercase identifier used on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
        }
    }

    /// Prefix of the environment variables holding this provider's settings
    pub fn env_prefix(self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OPENAI",
            ProviderId::Anthropic => "ANTHROPIC",
            ProviderId::Gemini => "GEMINI",
        }
    }

    /// Name of the environment variable for a given setting, e.g. `OPENAI_API_KEY`
    pub fn env_var(self, suffix: &str) -> String {
        format!("{}_{}", self.env_prefix(), suffix)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderId::OpenAI => write!(f, "OpenAI"),
            ProviderId::Anthropic => write!(f, "Anthropic"),
            ProviderId::Gemini => write!(f, "Gemini"),
        }
    }
}

impl FromStr for ProviderId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAI),
            "anthropic" => Ok(ProviderId::Anthropic),
            "gemini" => Ok(ProviderId::Gemini),
            _ => Err(ConfigError::UnknownProvider { name: s.to_string() }),
        }
    }
}

/// Provider-neutral description of a model returned by a listing call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelInfo {
    /// Identifier to pass back to the provider (never empty)
    pub id: String,

    /// Human readable name, when the provider supplies one
    pub name: Option<String>,

    /// Free-form description
    pub description: Option<String>,

    /// Creation time as a unix timestamp
    pub created: Option<i64>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            created: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_created(mut self, created: i64) -> Self {
        self.created = Some(created);
        self
    }
}

/// Outcome of checking whether a provider accepts the configured credentials
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn valid(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}
