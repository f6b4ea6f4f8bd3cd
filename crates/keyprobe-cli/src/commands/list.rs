//! `keyprobe list`: show a provider's models or check its key

use crate::render;
use anyhow::Result;
use clap::Args;
use keyprobe_core::{LlmProvider, ProviderFactory};
use keyprobe_shared::{
    ConfigOverrides, EnvSnapshot, KeyprobeError, ModelInfo, ProviderConfig, ProviderId,
    ValidationResult,
};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::debug;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Provider to query
    #[arg(value_parser = super::provider_parser())]
    pub provider: ProviderId,

    /// API key, overrides <PROVIDER>_API_KEY
    #[arg(short = 'k', long)]
    pub api_key: Option<String>,

    /// Base URL, overrides <PROVIDER>_BASE_URL
    #[arg(short = 'b', long)]
    pub base_url: Option<String>,

    /// Only check that the API key works
    #[arg(short = 'v', long)]
    pub validate: bool,
}

/// What a `list` run produced
pub enum ListOutcome {
    Models(Vec<ModelInfo>),
    Validation(ValidationResult),
    Failed(KeyprobeError),
}

impl ListOutcome {
    pub fn succeeded(&self) -> bool {
        match self {
            ListOutcome::Models(_) => true,
            ListOutcome::Validation(result) => result.ok,
            ListOutcome::Failed(_) => false,
        }
    }
}

pub async fn run(args: ListArgs, env: &EnvSnapshot) -> Result<ExitCode> {
    let provider = args.provider;
    let overrides = ConfigOverrides {
        api_key: args.api_key,
        base_url: args.base_url,
        ..Default::default()
    };

    let outcome = match ProviderConfig::resolve(provider, env, &overrides) {
        Ok(config) => {
            println!("{}", render::provider_panel(provider, &config));
            match ProviderFactory::create_provider(provider, &config) {
                Ok(client) => check(client.as_ref(), args.validate).await,
                Err(error) => ListOutcome::Failed(error),
            }
        }
        Err(error) => ListOutcome::Failed(error.into()),
    };

    report(provider, &outcome, &mut io::stdout(), &mut io::stderr())?;
    Ok(super::exit_code(outcome.succeeded()))
}

pub async fn check(provider: &dyn LlmProvider, validate: bool) -> ListOutcome {
    if validate {
        debug!("Validating {} API key", provider.id());
        return ListOutcome::Validation(provider.validate().await);
    }

    match provider.list_models().await {
        Ok(models) => ListOutcome::Models(models),
        Err(error) => ListOutcome::Failed(error),
    }
}

/// Print an outcome; failures go to `err`
pub fn report<O: Write, E: Write>(
    provider: ProviderId,
    outcome: &ListOutcome,
    out: &mut O,
    err: &mut E,
) -> io::Result<()> {
    match outcome {
        ListOutcome::Models(models) if models.is_empty() => {
            writeln!(out, "No models available from {}.", provider)?;
            writeln!(out, "{}", render::model_total(0))
        }
        ListOutcome::Models(models) => {
            writeln!(out, "{}", render::models_table(models))?;
            writeln!(out, "{}", render::model_total(models.len()))
        }
        ListOutcome::Validation(result) => {
            writeln!(out, "{}", render::validation_line(provider, result))
        }
        ListOutcome::Failed(error) => writeln!(err, "{}", render::error_block(provider, error)),
    }
}
