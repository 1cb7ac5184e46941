//! Feature encoding: column encoders and the dataset preprocessor.

pub mod columns;
pub mod preprocessor;

pub use columns::{
    normalize, CategoricalColumn, CategoricalColumns, NumericalColumn, NumericalColumns,
    OutOfVocabulary, DEFAULT_UNKNOWN_TOKEN,
};
pub use preprocessor::{
    compute_categorical_loss_weights, outputs_key, DatasetAnalysis, DatasetPreprocessor,
    FeatureArray, FeatureTensors, MAX_LOSS_WEIGHT, NUMERICAL_INPUTS_FEATURES_KEY,
    NUMERICAL_OUTPUTS_KEY,
};
