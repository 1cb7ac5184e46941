//! Project configuration loaded from a YAML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::db::connection::DbConfig;
use crate::features::OutOfVocabulary;
use crate::repository::ScanPolicy;
use crate::AutoembedError;

fn default_registry_path() -> PathBuf {
    PathBuf::from("models")
}

fn default_seed() -> u64 {
    42
}

/// Accept a single column name or a list of names.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(column) => vec![column],
        OneOrMany::Many(columns) => columns,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub vector_collection_name: String,
    #[serde(default)]
    pub metadata_columns: Vec<String>,
    /// Collection of consumer vectors; defaults to `<vector_collection_name>_consumers`.
    #[serde(default)]
    pub consumer_collection_name: Option<String>,
}

impl VectorStoreConfig {
    pub fn consumer_collection(&self) -> String {
        self.consumer_collection_name
            .clone()
            .unwrap_or_else(|| format!("{}_consumers", self.vector_collection_name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceType {
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(rename = "type")]
    pub source_type: DataSourceType,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub training: DataSource,
    pub prediction: DataSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelingColumns {
    #[serde(default)]
    pub categorical_columns: Vec<String>,
    #[serde(default)]
    pub numerical_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelingConfig {
    #[serde(default)]
    pub light_mode: bool,
    #[serde(default)]
    pub light_mode_sample_size: usize,
    pub bottle_neck_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_layer_sizes: Vec<usize>,
    pub modeling_columns: ModelingColumns,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualisationColumns {
    #[serde(default)]
    pub hover_data_columns_name: Vec<String>,
    #[serde(default)]
    pub color_data_column_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualisationConfig {
    pub n_samples: usize,
    #[serde(default)]
    pub visualisation_columns: VisualisationColumns,
}

impl Default for VisualisationConfig {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            visualisation_columns: VisualisationColumns::default(),
        }
    }
}

/// One project: which columns to model, where rows come from, where vectors go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoembedConfig {
    /// Registry name models are saved under.
    pub model_name: String,
    /// Columns forming the embedding id; several are joined with `-`.
    #[serde(deserialize_with = "one_or_many")]
    pub id_column: Vec<String>,
    pub vector_store: VectorStoreConfig,
    pub data: DataConfig,
    pub modeling: ModelingConfig,
    #[serde(default)]
    pub visualisation: VisualisationConfig,
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
    #[serde(default)]
    pub database: Option<DbConfig>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub scan_policy: ScanPolicy,
    #[serde(default)]
    pub out_of_vocabulary: OutOfVocabulary,
}

impl AutoembedConfig {
    pub fn from_file(path: &Path) -> Result<Self, AutoembedError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AutoembedError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&raw)?;
        tracing::info!("Loaded project config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, AutoembedError> {
        let config: Self = serde_yaml_ng::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AutoembedError> {
        let fail = |msg: &str| Err(AutoembedError::Config(msg.to_string()));

        if self.model_name.trim().is_empty() {
            return fail("model_name must not be empty");
        }
        if self.id_column.is_empty() || self.id_column.iter().any(|c| c.trim().is_empty()) {
            return fail("id_column must name at least one column");
        }
        if self.vector_store.vector_collection_name.trim().is_empty() {
            return fail("vector_store.vector_collection_name must not be empty");
        }
        let columns = &self.modeling.modeling_columns;
        if columns.numerical_columns.is_empty() && columns.categorical_columns.is_empty() {
            return fail("modeling_columns must declare at least one numerical or categorical column");
        }
        if self.modeling.epochs == 0 {
            return fail("modeling.epochs must be positive");
        }
        if self.modeling.batch_size == 0 {
            return fail("modeling.batch_size must be positive");
        }
        if self.modeling.bottle_neck_size == 0 {
            return fail("modeling.bottle_neck_size must be positive");
        }
        if self.modeling.hidden_layer_sizes.contains(&0) {
            return fail("modeling.hidden_layer_sizes must all be positive");
        }
        if self.modeling.light_mode && self.modeling.light_mode_sample_size == 0 {
            return fail("modeling.light_mode_sample_size must be positive when light_mode is on");
        }
        Ok(())
    }
}
