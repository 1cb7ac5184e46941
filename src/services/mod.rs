pub mod consumer;
pub mod prediction;
pub mod progress;
pub mod recommendation;
pub mod sampling;
pub mod training;

pub use consumer::ConsumerEmbeddingUpdater;
pub use prediction::{
    build_embeddings, PredictForModelRelease, PredictForModelReleaseCommand, PredictionOutcome,
};
pub use progress::{noop_progress, BarProgressReporter, NoopProgressReporter, ProgressReporter};
pub use recommendation::{RecommendationService, DEFAULT_RECOMMENDATIONS};
pub use sampling::{EmbeddingSample, SampleEmbeddings, SamplePoint};
pub use training::{TrainEmbeddingModel, TrainEmbeddingModelCommand, TrainingOutcome};
