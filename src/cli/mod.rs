//! CLI interface for autoembed.

pub mod handlers;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use output::OutputMode;

use crate::init::AppContext;
use crate::services::DEFAULT_RECOMMENDATIONS;

/// autoembed - tabular autoencoder embeddings for similarity recommendations
#[derive(Parser)]
#[command(name = "autoembed", version, about, long_about = None)]
pub struct Cli {
    /// Project configuration file
    #[arg(long, short, env = "AUTOEMBED_CONFIG", global = true, default_value = "autoembed.yaml")]
    pub config: PathBuf,

    /// Override data directory of the embedded vector store (default: ./.autoembed)
    #[arg(long, env = "AUTOEMBED_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit the preprocessor and autoencoder on the training data and register them
    Train,

    /// Embed the prediction data with a registered model and store the vectors
    Predict {
        /// Registry model id (default: latest)
        #[arg(long)]
        model_version: Option<String>,
    },

    /// Ids of the entities most similar to an id
    Recommend {
        id: String,
        /// Number of recommendations
        #[arg(short, long, default_value_t = DEFAULT_RECOMMENDATIONS)]
        n: usize,
    },

    /// Fold a consumer interaction with an item into the consumer's vector
    UpdateConsumer {
        consumer: String,
        item: String,
        /// Interaction type: contact, detail, listing (other names count as weak intent)
        event: String,
    },

    /// Random sample of stored embeddings with their display columns
    Sample {
        /// Sample size (default: visualisation.n_samples)
        #[arg(short, long)]
        n: Option<usize>,
        /// Sampling seed (default: the project seed)
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub async fn execute(command: &Commands, ctx: &AppContext, mode: OutputMode) -> anyhow::Result<()> {
    match command {
        Commands::Train => handlers::train::handle_train(ctx, mode).await?,
        Commands::Predict { model_version } => {
            handlers::predict::handle_predict(ctx, model_version.as_deref(), mode).await?
        }
        Commands::Recommend { id, n } => handlers::recommend::handle_recommend(ctx, id, *n, mode).await?,
        Commands::UpdateConsumer {
            consumer,
            item,
            event,
        } => handlers::consumer::handle_update_consumer(ctx, consumer, item, event, mode).await?,
        Commands::Sample { n, seed } => handlers::sample::handle_sample(ctx, *n, *seed, mode).await?,
    }
    Ok(())
}
