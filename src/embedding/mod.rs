//! Embedding model infrastructure.
//!
//! The [`EmbeddingModel`] trait abstracts the autoencoder lifecycle (build from
//! a dataset schema, fit, embed, save, load) so the registry and use cases do
//! not depend on a tensor library. [`CandleAutoencoder`] implements it on
//! candle.

pub mod architecture;
pub mod candle_backend;
pub mod model;

use std::path::Path;

use ndarray::Array2;
use serde::Serialize;

use crate::features::{DatasetAnalysis, FeatureTensors};
use crate::AutoembedError;

pub use architecture::{AutoencoderSpec, CategoricalFeatureSpec};
pub use model::CandleAutoencoder;

/// Training loop settings.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of rows held out for validation, taken from the end of the data.
    pub validation_split: f64,
    /// Reshuffle training rows every epoch.
    pub shuffle: bool,
    pub seed: u64,
}

impl FitOptions {
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        Self {
            epochs,
            batch_size,
            validation_split: 0.2,
            shuffle: true,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Losses recorded at the end of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub val_loss: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.loss)
    }
}

/// Autoencoder whose encoder half produces the embedding vectors.
pub trait EmbeddingModel: Send + Sync {
    /// Assemble the encoder/decoder topology for a fitted dataset schema.
    fn from_dataset_analysis(
        analysis: &DatasetAnalysis,
        bottleneck_dim: usize,
        hidden_layer_dims: &[usize],
    ) -> Result<Self, AutoembedError>
    where
        Self: Sized;

    /// Train end to end on inputs `x` against reconstruction targets `y`.
    fn fit(
        &mut self,
        x: &FeatureTensors,
        y: &FeatureTensors,
        options: &FitOptions,
    ) -> Result<TrainingHistory, AutoembedError>;

    /// Run the encoder only: one bottleneck vector per input row.
    fn embed(&self, x: &FeatureTensors) -> Result<Array2<f32>, AutoembedError>;

    /// Width of the vectors returned by [`embed`](EmbeddingModel::embed).
    fn embedding_dim(&self) -> usize;

    /// Persist the full autoencoder and the encoder as separate artifacts under `path`.
    fn save(&self, path: &Path) -> Result<(), AutoembedError>;

    /// Restore a model saved with [`save`](EmbeddingModel::save).
    fn load(path: &Path) -> Result<Self, AutoembedError>
    where
        Self: Sized;
}
