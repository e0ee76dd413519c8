mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use config::ProvidersFile;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = std::env::var("YPROMPT_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let api_key = cli.api_key.as_deref();
    match cli.command {
        Commands::Providers { family } => commands::providers(family.map(Into::into)),
        Commands::Chat {
            provider,
            model,
            system,
            no_stream,
            detailed,
            prompt,
        } => {
            let file = ProvidersFile::load(cli.config.as_deref())?;
            let provider = file.provider(&provider, api_key)?;
            let request = commands::ChatRequest {
                system,
                prompt: prompt.join(" "),
                stream: !no_stream,
                detailed,
            };
            commands::chat(&file, &provider, &model, request).await
        }
        Commands::Probe {
            provider,
            model,
            json,
        } => {
            let file = ProvidersFile::load(cli.config.as_deref())?;
            let provider = file.provider(&provider, api_key)?;
            commands::probe(&file, &provider, &model, json).await
        }
        Commands::Models { provider } => {
            let file = ProvidersFile::load(cli.config.as_deref())?;
            let provider = file.provider(&provider, api_key)?;
            commands::models(&file, &provider).await
        }
    }
}
