//! `keyprobe chat`: send one message to one or all providers

use crate::render;
use anyhow::Result;
use clap::Args;
use futures::stream::{FuturesUnordered, StreamExt};
use keyprobe_core::{BoxedProvider, ProviderFactory};
use keyprobe_shared::{
    default_model, ConfigOverrides, EnvSnapshot, KeyprobeError, ProviderConfig, ProviderId,
};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{debug, warn};

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Message to send
    pub message: String,

    /// Provider to ask; all of them when omitted
    #[arg(short, long, value_parser = super::provider_parser())]
    pub provider: Option<ProviderId>,

    /// Model, overrides <PROVIDER>_DEFAULT_MODEL
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt, overrides <PROVIDER>_SYSTEM_PROMPT
    #[arg(short, long)]
    pub system_prompt: Option<String>,
}

/// A provider ready to be asked, or the reason it cannot be
pub struct ChatTarget {
    pub provider: ProviderId,
    pub model: String,
    pub system_prompt: String,
    pub client: keyprobe_shared::Result<BoxedProvider>,
}

/// Everything one provider answered before its stream ended
#[derive(Debug)]
pub struct ChatOutcome {
    pub provider: ProviderId,
    pub model: String,
    pub text: String,
    pub error: Option<KeyprobeError>,
}

pub async fn run(args: ChatArgs, env: &EnvSnapshot) -> Result<ExitCode> {
    let targets = prepare_targets(&args, env);
    let outcomes = dispatch(targets, &args.message, &mut io::stdout()).await?;

    Ok(super::exit_code(!all_failed(&outcomes)))
}

/// Resolve configuration for every requested provider.
///
/// A provider whose configuration fails still gets a target so the failure is
/// reported alongside the others instead of aborting the run.
pub fn prepare_targets(args: &ChatArgs, env: &EnvSnapshot) -> Vec<ChatTarget> {
    let providers = match args.provider {
        Some(provider) => vec![provider],
        None => ProviderId::ALL.to_vec(),
    };

    let overrides = ConfigOverrides {
        model: args.model.clone(),
        system_prompt: args.system_prompt.clone(),
        ..Default::default()
    };

    providers
        .into_iter()
        .map(|provider| match ProviderConfig::resolve(provider, env, &overrides) {
            Ok(config) => {
                let client = ProviderFactory::create_provider(provider, &config);
                ChatTarget {
                    provider,
                    model: config.default_model,
                    system_prompt: config.system_prompt,
                    client,
                }
            }
            Err(error) => ChatTarget {
                provider,
                model: args
                    .model
                    .clone()
                    .unwrap_or_else(|| default_model(provider).to_string()),
                system_prompt: String::new(),
                client: Err(error.into()),
            },
        })
        .collect()
}

/// Drain one provider's reply, handing each fragment to `on_chunk` as it arrives
pub async fn collect_reply<F>(
    target: ChatTarget,
    message: &str,
    mut on_chunk: F,
) -> io::Result<ChatOutcome>
where
    F: FnMut(&str) -> io::Result<()>,
{
    let ChatTarget {
        provider,
        model,
        system_prompt,
        client,
    } = target;

    let mut outcome = ChatOutcome {
        provider,
        model,
        text: String::new(),
        error: None,
    };

    let client = match client {
        Ok(client) => client,
        Err(error) => {
            outcome.error = Some(error);
            return Ok(outcome);
        }
    };

    let mut stream = match client.chat(message, &outcome.model, &system_prompt).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!("{} chat request failed: {}", provider, error);
            outcome.error = Some(error);
            return Ok(outcome);
        }
    };

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(text) => {
                on_chunk(&text)?;
                outcome.text.push_str(&text);
            }
            Err(error) => {
                warn!(
                    "{} stream failed after {} bytes: {}",
                    provider,
                    outcome.text.len(),
                    error
                );
                outcome.error = Some(error);
                break;
            }
        }
    }

    Ok(outcome)
}

/// Ask every target and print the replies.
///
/// A single target is echoed live. Several targets run concurrently and each
/// reply is printed as one block when its stream ends, in completion order.
pub async fn dispatch<W: Write>(
    targets: Vec<ChatTarget>,
    message: &str,
    out: &mut W,
) -> io::Result<Vec<ChatOutcome>> {
    debug!("Dispatching chat to {} provider(s)", targets.len());

    if targets.len() == 1 {
        let mut outcomes = Vec::with_capacity(1);
        for target in targets {
            writeln!(out, "{}", render::chat_header(target.provider, &target.model))?;
            out.flush()?;

            let outcome = collect_reply(target, message, |chunk| {
                out.write_all(chunk.as_bytes())?;
                out.flush()
            })
            .await?;

            finish_block(&outcome, out)?;
            outcomes.push(outcome);
        }
        return Ok(outcomes);
    }

    let mut pending: FuturesUnordered<_> = targets
        .into_iter()
        .map(|target| collect_reply(target, message, |_: &str| -> io::Result<()> { Ok(()) }))
        .collect();

    let mut outcomes = Vec::new();
    while let Some(outcome) = pending.next().await {
        let outcome = outcome?;
        writeln!(out, "{}", render::chat_header(outcome.provider, &outcome.model))?;
        out.write_all(outcome.text.as_bytes())?;
        finish_block(&outcome, out)?;
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

fn finish_block<W: Write>(outcome: &ChatOutcome, out: &mut W) -> io::Result<()> {
    if !outcome.text.is_empty() {
        writeln!(out)?;
    }
    if let Some(error) = &outcome.error {
        writeln!(out, "{}", render::error_block(outcome.provider, error))?;
    }
    writeln!(out)?;
    out.flush()
}

/// True when no provider produced a complete reply
pub fn all_failed(outcomes: &[ChatOutcome]) -> bool {
    !outcomes.is_empty() && outcomes.iter().all(|outcome| outcome.error.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{reply, MockProvider};
    use keyprobe_shared::ErrorKind;

    fn target(provider: ProviderId, mock: MockProvider) -> ChatTarget {
        ChatTarget {
            provider,
            model: default_model(provider).to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
            client: Ok(Box::new(mock)),
        }
    }

    fn greeting() -> MockProvider {
        let mut mock = MockProvider::new();
        mock.expect_chat()
            .times(1)
            .returning(|_, _, _| Ok(reply(&["Hello", ", ", "world"])));
        mock
    }

    fn args(provider: Option<ProviderId>, model: Option<&str>) -> ChatArgs {
        ChatArgs {
            message: "Hi".to_string(),
            provider,
            model: model.map(str::to_string),
            system_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_collect_reply_keeps_chunk_order() {
        let mut mock = MockProvider::new();
        mock.expect_chat()
            .withf(|message, model, system_prompt| {
                message == "Say hello"
                    && model == "gpt-4o-mini"
                    && system_prompt == "You are a helpful assistant."
            })
            .times(1)
            .returning(|_, _, _| Ok(reply(&["Hello", ", ", "world"])));

        let mut seen = Vec::new();
        let outcome = collect_reply(target(ProviderId::OpenAI, mock), "Say hello", |chunk| {
            seen.push(chunk.to_string());
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(seen, vec!["Hello", ", ", "world"]);
        assert_eq!(outcome.text, "Hello, world");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_partial_text() {
        let mut mock = MockProvider::new();
        mock.expect_chat().returning(|_, _, _| {
            let items = vec![
                Ok("Par".to_string()),
                Err(KeyprobeError::unexpected(ProviderId::Anthropic, "Overloaded")),
                Ok("never".to_string()),
            ];
            Ok(Box::pin(futures::stream::iter(items)))
        });

        let outcome = collect_reply(target(ProviderId::Anthropic, mock), "Hi", |_| Ok(()))
            .await
            .unwrap();

        assert_eq!(outcome.text, "Par");
        assert_eq!(outcome.error.map(|e| e.kind()), Some(ErrorKind::ProviderError));
    }

    #[tokio::test]
    async fn test_single_provider_streams_live() {
        let mut out = Vec::new();

        let outcomes = dispatch(vec![target(ProviderId::OpenAI, greeting())], "Hi", &mut out)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("OpenAI (gpt-4o-mini)"));
        assert!(printed.contains("Hello, world\n"));
        assert!(!all_failed(&outcomes));
    }

    #[tokio::test]
    async fn test_fan_out_isolates_failures() {
        let mut failing = MockProvider::new();
        failing.expect_chat().returning(|_, _, _| {
            Err(KeyprobeError::from_status(ProviderId::Anthropic, 401, ""))
        });

        let targets = vec![
            target(ProviderId::OpenAI, greeting()),
            target(ProviderId::Anthropic, failing),
            ChatTarget {
                provider: ProviderId::Gemini,
                model: "gemini-2.0-flash".to_string(),
                system_prompt: String::new(),
                client: Err(KeyprobeError::Config {
                    message: "API key not provided for Gemini".to_string(),
                }),
            },
        ];

        let mut out = Vec::new();
        let outcomes = dispatch(targets, "Hi", &mut out).await.unwrap();
        let printed = String::from_utf8(out).unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(!all_failed(&outcomes));
        assert!(printed.contains("Hello, world"));
        assert!(printed.contains("AuthError"));
        assert!(printed.contains("ConfigError"));

        let openai = outcomes
            .iter()
            .find(|o| o.provider == ProviderId::OpenAI)
            .unwrap();
        assert_eq!(openai.text, "Hello, world");
    }

    #[tokio::test]
    async fn test_all_failed_only_when_every_provider_fails() {
        let targets: Vec<ChatTarget> = ProviderId::ALL
            .into_iter()
            .map(|provider| ChatTarget {
                provider,
                model: default_model(provider).to_string(),
                system_prompt: String::new(),
                client: Err(KeyprobeError::Network {
                    provider,
                    message: "connection refused".to_string(),
                }),
            })
            .collect();

        let mut out = Vec::new();
        let outcomes = dispatch(targets, "Hi", &mut out).await.unwrap();

        assert!(all_failed(&outcomes));
        assert!(!all_failed(&[]));
    }

    #[test]
    fn test_prepare_targets_fans_out_to_all_providers() {
        let env: EnvSnapshot = [("OPENAI_API_KEY", "sk-test")].into_iter().collect();

        let targets = prepare_targets(&args(None, None), &env);
        let providers: Vec<ProviderId> = targets.iter().map(|t| t.provider).collect();
        assert_eq!(providers, ProviderId::ALL.to_vec());

        assert!(targets[0].client.is_ok());
        assert_eq!(targets[0].model, "gpt-4o-mini");
        for missing in &targets[1..] {
            let kind = missing.client.as_ref().err().map(|e| e.kind());
            assert_eq!(kind, Some(ErrorKind::ConfigError));
        }
    }

    #[test]
    fn test_prepare_targets_single_provider_with_model() {
        let env: EnvSnapshot = [
            ("GEMINI_API_KEY", "AIza-test"),
            ("GEMINI_DEFAULT_MODEL", "gemini-1.5-pro"),
        ]
        .into_iter()
        .collect();

        let args = args(Some(ProviderId::Gemini), Some("gemini-2.0-flash-lite"));
        let targets = prepare_targets(&args, &env);

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].model, "gemini-2.0-flash-lite");
        assert!(targets[0].client.is_ok());
    }
}
