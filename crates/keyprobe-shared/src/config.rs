//! Configuration management for keyprobe
//!
//! Provider settings come from two places: the process environment (optionally
//! seeded from a `.env` file) and command-line flags. Resolution is a pure
//! function of an [`EnvSnapshot`] and a set of [`ConfigOverrides`], so nothing
//! here touches the real environment except [`EnvSnapshot::from_process`].

use crate::error::ConfigError;
use crate::types::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;

/// System prompt used when neither the environment nor a flag sets one
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Model used for `chat` when nothing else is configured
pub fn default_model(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::OpenAI => "gpt-4o-mini",
        ProviderId::Anthropic => "claude-3-5-haiku-latest",
        ProviderId::Gemini => "gemini-2.0-flash",
    }
}

/// Fully resolved settings for a single provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key sent with every request
    pub api_key: String,

    /// Custom endpoint, `None` means the vendor default
    pub base_url: Option<String>,

    /// Model used for chat when no model is requested explicitly
    pub default_model: String,

    /// System prompt sent ahead of the user message
    pub system_prompt: String,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Merge environment defaults with command-line overrides; flags win.
    ///
    /// Empty strings count as unset on both sides.
    pub fn resolve(
        provider: ProviderId,
        env: &EnvSnapshot,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let key_var = provider.env_var("API_KEY");

        let api_key = non_empty(overrides.api_key.as_deref())
            .or_else(|| env.get(&key_var))
            .ok_or_else(|| ConfigError::MissingApiKey {
                provider,
                env_var: key_var.clone(),
            })?;

        let base_url = non_empty(overrides.base_url.as_deref())
            .or_else(|| env.get(&provider.env_var("BASE_URL")))
            .map(|url| url.trim_end_matches('/').to_string());

        let model = non_empty(overrides.model.as_deref())
            .or_else(|| env.get(&provider.env_var("DEFAULT_MODEL")))
            .unwrap_or_else(|| default_model(provider));

        let system_prompt = non_empty(overrides.system_prompt.as_deref())
            .or_else(|| env.get(&provider.env_var("SYSTEM_PROMPT")))
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        Ok(Self {
            api_key: api_key.to_string(),
            base_url,
            default_model: model.to_string(),
            system_prompt: system_prompt.to_string(),
        })
    }
}

/// Values supplied on the command line, each one optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

/// Immutable copy of the environment variables relevant to resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    /// Build a snapshot from raw variables, skipping any that are not valid UTF-8
    pub fn from_os_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    /// Look up a variable, treating empty values as missing
    pub fn get(&self, key: &str) -> Option<&str> {
        non_empty(self.vars.get(key).map(String::as_str))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_env() -> EnvSnapshot {
        [
            ("OPENAI_API_KEY", "sk-from-env"),
            ("OPENAI_BASE_URL", "https://env.example.com/v1"),
            ("OPENAI_DEFAULT_MODEL", "gpt-4o"),
            ("OPENAI_SYSTEM_PROMPT", "Be terse."),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_resolve_from_environment() {
        let config =
            ProviderConfig::resolve(ProviderId::OpenAI, &openai_env(), &ConfigOverrides::default())
                .unwrap();

        assert_eq!(config.api_key, "sk-from-env");
        assert_eq!(config.base_url.as_deref(), Some("https://env.example.com/v1"));
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.system_prompt, "Be terse.");
    }

    #[test]
    fn test_flags_override_environment() {
        let overrides = ConfigOverrides {
            api_key: Some("sk-from-flag".to_string()),
            base_url: Some("https://flag.example.com/v1/".to_string()),
            model: Some("o3-mini".to_string()),
            system_prompt: Some("Answer in French.".to_string()),
        };

        let config = ProviderConfig::resolve(ProviderId::OpenAI, &openai_env(), &overrides).unwrap();

        assert_eq!(config.api_key, "sk-from-flag");
        assert_eq!(config.base_url.as_deref(), Some("https://flag.example.com/v1"));
        assert_eq!(config.default_model, "o3-mini");
        assert_eq!(config.system_prompt, "Answer in French.");
    }

    #[test]
    fn test_defaults_when_unset() {
        let env: EnvSnapshot = [("GEMINI_API_KEY", "g-key")].into_iter().collect();
        let config =
            ProviderConfig::resolve(ProviderId::Gemini, &env, &ConfigOverrides::default()).unwrap();

        assert!(config.base_url.is_none());
        assert_eq!(config.default_model, "gemini-2.0-flash");
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_missing_api_key() {
        let env: EnvSnapshot = [("ANTHROPIC_API_KEY", "  ")].into_iter().collect();
        let err = ProviderConfig::resolve(ProviderId::Anthropic, &env, &ConfigOverrides::default())
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::MissingApiKey { provider: ProviderId::Anthropic, .. }
        ));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_empty_flag_falls_back_to_environment() {
        let overrides = ConfigOverrides {
            api_key: Some(String::new()),
            ..Default::default()
        };

        let config = ProviderConfig::resolve(ProviderId::OpenAI, &openai_env(), &overrides).unwrap();
        assert_eq!(config.api_key, "sk-from-env");
    }

    #[test]
    fn test_other_providers_env_is_ignored() {
        let env: EnvSnapshot = [("OPENAI_API_KEY", "sk-openai")].into_iter().collect();
        let result = ProviderConfig::resolve(ProviderId::Anthropic, &env, &ConfigOverrides::default());

        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("GEMINI_API_KEY"), OsString::from("AIza-test")),
            (OsString::from("KEYPROBE_BINARY_VALUE"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![0xc3, 0x28]), OsString::from("bad key")),
        ];

        let env = EnvSnapshot::from_os_vars(vars);
        assert_eq!(env.get("GEMINI_API_KEY"), Some("AIza-test"));
        assert_eq!(env.get("KEYPROBE_BINARY_VALUE"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_snapshot_survives_non_utf8_environment() {
        use std::os::unix::ffi::OsStrExt;

        let name = "KEYPROBE_TEST_NON_UTF8";
        // SAFETY: the variable name is unique to this test and nothing else reads it
        unsafe { std::env::set_var(name, std::ffi::OsStr::from_bytes(b"\xff\xfe")) };

        let env = EnvSnapshot::from_process();

        unsafe { std::env::remove_var(name) };
        assert_eq!(env.get(name), None);
    }
}
