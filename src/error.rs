use std::fmt;

use thiserror::Error;

/// A single chunk of a batched vector-store write that did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    /// Position of the chunk in the upsert plan (0-based).
    pub index: usize,
    /// Offset of the chunk's first item in the original batch.
    pub offset: usize,
    /// Number of items in the chunk.
    pub len: usize,
    pub message: String,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} (items {}..{}): {}",
            self.index,
            self.offset,
            self.offset + self.len,
            self.message
        )
    }
}

/// Custom error type for autoembed operations.
#[derive(Debug, Error)]
pub enum AutoembedError {
    /// A preprocessor or column encoder was used before `fit`.
    #[error("{component} is not fitted: call fit() before transforming data")]
    NotFitted { component: String },

    /// Requested entity was not found.
    #[error("Not found: {entity_type} with id '{id}'")]
    NotFound { entity_type: String, id: String },

    /// The "latest" alias was requested but the registry holds no model yet.
    #[error("No models found for '{registry_name}' in {path}. Please train a model first.")]
    NoTrainedModel { registry_name: String, path: String },

    /// Two embeddings that must be combined have different dimensionality.
    #[error("Embedding shape mismatch: expected {expected} dimensions, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// One or more chunks of a batched vector-store write failed.
    ///
    /// Chunks not listed in `failures` were written; nothing is rolled back.
    #[error(
        "{} of {} chunks failed during batch upsert: {}",
        .failures.len(),
        .total_chunks,
        .failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    PartialBatchFailure {
        total_chunks: usize,
        failures: Vec<ChunkFailure>,
    },

    /// Declared columns do not match the input data.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A categorical value outside the training vocabulary under the strict policy.
    #[error("Unknown category '{value}' in column '{column}'")]
    UnknownCategory { column: String, value: String },

    /// Tensor construction, training, or weight I/O failed.
    #[error("Model error: {0}")]
    Model(String),

    /// Vector store operation failed.
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Encoding or decoding a persisted document failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AutoembedError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        AutoembedError::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn not_fitted(component: impl Into<String>) -> Self {
        AutoembedError::NotFitted {
            component: component.into(),
        }
    }
}

impl From<surrealdb::Error> for AutoembedError {
    fn from(err: surrealdb::Error) -> Self {
        AutoembedError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AutoembedError {
    fn from(err: serde_json::Error) -> Self {
        AutoembedError::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<serde_yaml_ng::Error> for AutoembedError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        AutoembedError::Config(format!("YAML error: {}", err))
    }
}

impl From<csv::Error> for AutoembedError {
    fn from(err: csv::Error) -> Self {
        AutoembedError::Serialization(format!("CSV error: {}", err))
    }
}

impl From<std::io::Error> for AutoembedError {
    fn from(err: std::io::Error) -> Self {
        AutoembedError::Io(err.to_string())
    }
}

impl From<candle_core::Error> for AutoembedError {
    fn from(err: candle_core::Error) -> Self {
        AutoembedError::Model(err.to_string())
    }
}

impl From<ndarray::ShapeError> for AutoembedError {
    fn from(err: ndarray::ShapeError) -> Self {
        AutoembedError::Model(format!("Array shape error: {}", err))
    }
}
