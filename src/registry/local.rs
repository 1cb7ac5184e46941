use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ModelRegistry, LATEST};
use crate::embedding::EmbeddingModel;
use crate::features::{CategoricalColumns, DatasetPreprocessor, NumericalColumns};
use crate::utils::sanitize::validate_path_segment;
use crate::AutoembedError;

pub const PREPROCESSOR_FILE: &str = "preprocessor.json";

/// Serialized encoder parameters of a fitted preprocessor.
#[derive(Debug, Serialize, Deserialize)]
struct PreprocessorState {
    numerical_columns: NumericalColumns,
    categorical_columns: CategoricalColumns,
    #[serde(default)]
    categorical_features_loss_weights: Option<BTreeMap<String, f64>>,
    unknown_token: String,
}

/// Filesystem registry: `<root>/<registry_name>/<model_id>/`.
#[derive(Debug, Clone)]
pub struct LocalModelRegistry {
    root: PathBuf,
}

impl LocalModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn registry_dir(&self, registry_name: &str) -> Result<PathBuf, AutoembedError> {
        Ok(self.root.join(validate_path_segment(registry_name)?))
    }

    fn new_model_id() -> String {
        format!(
            "model-{}-{}",
            Utc::now().format("%Y-%m-%d-%H-%M-%S"),
            Uuid::new_v4()
        )
    }

    /// Entry directories with their creation time (modification time where
    /// the filesystem records no birth time).
    fn entries(&self, registry_name: &str) -> Result<Vec<(SystemTime, String)>, AutoembedError> {
        let dir = self.registry_dir(registry_name)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_dir() {
                continue;
            }
            let created = metadata.created().or_else(|_| metadata.modified())?;
            entries.push((created, entry.file_name().to_string_lossy().into_owned()));
        }
        Ok(entries)
    }

    fn entry_dir(&self, registry_name: &str, model_id: &str) -> Result<PathBuf, AutoembedError> {
        let id = self.resolve_model_id(registry_name, model_id)?;
        Ok(self.registry_dir(registry_name)?.join(id))
    }
}

impl ModelRegistry for LocalModelRegistry {
    fn save(
        &self,
        model: &dyn EmbeddingModel,
        preprocessor: &DatasetPreprocessor,
        registry_name: &str,
    ) -> Result<String, AutoembedError> {
        let analysis = preprocessor.get_analysis()?;
        let state = PreprocessorState {
            numerical_columns: analysis.numerical_columns,
            categorical_columns: analysis.categorical_columns,
            categorical_features_loss_weights: analysis.categorical_features_loss_weights,
            unknown_token: preprocessor.unknown_token().to_string(),
        };

        let model_id = Self::new_model_id();
        let dir = self.registry_dir(registry_name)?.join(&model_id);
        fs::create_dir_all(&dir)?;

        let written = fs::write(dir.join(PREPROCESSOR_FILE), serde_json::to_string_pretty(&state)?)
            .map_err(AutoembedError::from)
            .and_then(|_| model.save(&dir));
        if let Err(e) = written {
            // A half-written entry would otherwise become "latest"
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                warn!("Failed to remove incomplete entry {}: {}", dir.display(), cleanup);
            }
            return Err(e);
        }

        info!("Saved model {} to registry '{}'", model_id, registry_name);
        Ok(model_id)
    }

    fn load_preprocessor(
        &self,
        registry_name: &str,
        model_id: &str,
    ) -> Result<DatasetPreprocessor, AutoembedError> {
        let path = self.entry_dir(registry_name, model_id)?.join(PREPROCESSOR_FILE);
        let raw = fs::read_to_string(&path)?;
        let state: PreprocessorState = serde_json::from_str(&raw)?;
        for column in state.categorical_columns.iter() {
            column.validate()?;
        }
        debug!("Loaded preprocessor from {}", path.display());

        Ok(DatasetPreprocessor::from_columns(
            state.numerical_columns,
            state.categorical_columns,
            state.categorical_features_loss_weights,
        )
        .with_unknown_token(state.unknown_token))
    }

    fn model_path(&self, registry_name: &str, model_id: &str) -> Result<PathBuf, AutoembedError> {
        self.entry_dir(registry_name, model_id)
    }

    fn resolve_model_id(&self, registry_name: &str, model_id: &str) -> Result<String, AutoembedError> {
        if model_id == LATEST {
            return self
                .list_models(registry_name)?
                .into_iter()
                .next()
                .ok_or_else(|| AutoembedError::NoTrainedModel {
                    registry_name: registry_name.to_string(),
                    path: self.root.join(registry_name).display().to_string(),
                });
        }

        let dir = self.registry_dir(registry_name)?.join(validate_path_segment(model_id)?);
        if dir.is_dir() {
            Ok(model_id.to_string())
        } else {
            Err(AutoembedError::not_found(
                "model",
                format!("{}/{}", registry_name, model_id),
            ))
        }
    }

    fn list_models(&self, registry_name: &str) -> Result<Vec<String>, AutoembedError> {
        let mut entries = self.entries(registry_name)?;
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(entries.into_iter().map(|(_, id)| id).collect())
    }
}
