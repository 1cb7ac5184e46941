//! Schema value object the autoencoder graph is built from.

use serde::{Deserialize, Serialize};

use crate::features::DatasetAnalysis;
use crate::AutoembedError;

pub const DEFAULT_DROPOUT: f32 = 0.2;
pub const DEFAULT_LEARNING_RATE: f64 = 0.005;
pub const NUMERICAL_LOSS_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalFeatureSpec {
    pub name: String,
    /// Vocabulary size including the unknown token.
    pub vocabulary_size: usize,
    pub embedding_dim: usize,
    pub loss_weight: f64,
}

impl CategoricalFeatureSpec {
    /// Rows in the embedding table and classes in the softmax head.
    pub fn table_size(&self) -> usize {
        self.vocabulary_size + 1
    }
}

/// Everything needed to rebuild the autoencoder graph without the dataset.
///
/// Persisted next to the weights as `architecture.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoencoderSpec {
    pub numerical_features: usize,
    pub categorical_features: Vec<CategoricalFeatureSpec>,
    pub bottleneck_dim: usize,
    pub hidden_layer_dims: Vec<usize>,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

fn default_dropout() -> f32 {
    DEFAULT_DROPOUT
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

impl AutoencoderSpec {
    pub fn from_dataset_analysis(
        analysis: &DatasetAnalysis,
        bottleneck_dim: usize,
        hidden_layer_dims: &[usize],
    ) -> Result<Self, AutoembedError> {
        let categorical_features = analysis
            .categorical_columns
            .iter()
            .map(|column| CategoricalFeatureSpec {
                name: column.name.clone(),
                vocabulary_size: column.vocabulary_size(),
                embedding_dim: column.embedding_dim,
                loss_weight: analysis.loss_weight(&column.name),
            })
            .collect();

        let spec = Self {
            numerical_features: analysis.numerical_columns.len(),
            categorical_features,
            bottleneck_dim,
            hidden_layer_dims: hidden_layer_dims.to_vec(),
            dropout: DEFAULT_DROPOUT,
            learning_rate: DEFAULT_LEARNING_RATE,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), AutoembedError> {
        if self.numerical_features == 0 && self.categorical_features.is_empty() {
            return Err(AutoembedError::InvalidSchema(
                "the model needs at least one numerical or categorical column".to_string(),
            ));
        }
        if self.bottleneck_dim == 0 {
            return Err(AutoembedError::InvalidSchema(
                "bottleneck dimension must be positive".to_string(),
            ));
        }
        if self.hidden_layer_dims.contains(&0) {
            return Err(AutoembedError::InvalidSchema(
                "hidden layer widths must be positive".to_string(),
            ));
        }
        if let Some(feature) = self
            .categorical_features
            .iter()
            .find(|f| f.vocabulary_size == 0 || f.embedding_dim == 0)
        {
            return Err(AutoembedError::InvalidSchema(format!(
                "categorical feature '{}' has an empty vocabulary or embedding",
                feature.name
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(AutoembedError::InvalidSchema(format!(
                "dropout {} must be in [0, 1)",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Width of the concatenated numeric block and flattened embeddings.
    pub fn input_width(&self) -> usize {
        self.numerical_features
            + self
                .categorical_features
                .iter()
                .map(|f| f.embedding_dim)
                .sum::<usize>()
    }
}
