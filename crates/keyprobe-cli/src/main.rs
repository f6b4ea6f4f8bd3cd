use anyhow::Result;
use clap::{Parser, Subcommand};
use keyprobe_shared::EnvSnapshot;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

use commands::chat::ChatArgs;
use commands::list::ListArgs;

#[derive(Parser)]
#[command(name = "keyprobe")]
#[command(about = "Check AI provider API keys, list their models and chat with them")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging on stderr
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List a provider's models, or validate its API key
    List(ListArgs),
    /// Send a message to one provider, or to all of them
    Chat(ChatArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Values already in the process environment take precedence over .env
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let env = EnvSnapshot::from_process();

    match cli.command {
        Commands::List(args) => commands::list::run(args, &env).await,
        Commands::Chat(args) => commands::chat::run(args, &env).await,
    }
}
