//! autoembed - tabular autoencoder embeddings for similarity recommendations
//!
//! Usage:
//!   autoembed train                        Fit and register a model
//!   autoembed predict --model-version ID   Embed prediction rows (default: latest)
//!   autoembed recommend <id> -n 10         Most similar ids
//!   autoembed update-consumer <c> <i> <e>  Fold an interaction into a consumer vector
//!   autoembed sample -n 500                Random stored embeddings
//!   autoembed --help                       Show all commands

use anyhow::Result;
use clap::Parser;

use autoembed::cli::output::OutputMode;
use autoembed::cli::Cli;
use autoembed::config::AutoembedConfig;
use autoembed::init::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing to stderr, stdout carries command output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("autoembed=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);
    let config = AutoembedConfig::from_file(&cli.config)?;
    let ctx = AppContext::new(config, cli.data_path.clone()).await?;
    autoembed::cli::execute(&cli.command, &ctx, mode).await?;

    Ok(())
}
