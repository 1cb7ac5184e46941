//! Model registry: versioned storage of fitted preprocessors and trained models.

pub mod local;

use std::path::PathBuf;

use crate::embedding::EmbeddingModel;
use crate::features::DatasetPreprocessor;
use crate::AutoembedError;

pub use local::{LocalModelRegistry, PREPROCESSOR_FILE};

/// Model id alias resolved at read time to the most recently created entry.
pub const LATEST: &str = "latest";

/// Storage of (preprocessor, model) pairs keyed by registry name and model id.
pub trait ModelRegistry: Send + Sync {
    /// Persist a fitted preprocessor and its trained model under a new id.
    fn save(
        &self,
        model: &dyn EmbeddingModel,
        preprocessor: &DatasetPreprocessor,
        registry_name: &str,
    ) -> Result<String, AutoembedError>;

    /// Rebuild the fitted preprocessor of an entry. Accepts [`LATEST`].
    fn load_preprocessor(
        &self,
        registry_name: &str,
        model_id: &str,
    ) -> Result<DatasetPreprocessor, AutoembedError>;

    /// Directory holding the model artifacts of an entry. Accepts [`LATEST`].
    fn model_path(&self, registry_name: &str, model_id: &str) -> Result<PathBuf, AutoembedError>;

    /// Turn [`LATEST`] into a concrete id; explicit ids are checked for existence.
    fn resolve_model_id(&self, registry_name: &str, model_id: &str) -> Result<String, AutoembedError>;

    /// Ids of every entry, newest first.
    fn list_models(&self, registry_name: &str) -> Result<Vec<String>, AutoembedError>;
}

/// Typed model loading for any registry, including trait objects.
pub trait ModelRegistryExt {
    fn load_model<M: EmbeddingModel>(
        &self,
        registry_name: &str,
        model_id: &str,
    ) -> Result<M, AutoembedError>;
}

impl<R: ModelRegistry + ?Sized> ModelRegistryExt for R {
    fn load_model<M: EmbeddingModel>(
        &self,
        registry_name: &str,
        model_id: &str,
    ) -> Result<M, AutoembedError> {
        let path = self.model_path(registry_name, model_id)?;
        tracing::info!("Loading model from {}", path.display());
        M::load(&path)
    }
}
