//! Item-to-item recommendations from stored embeddings.

use std::sync::Arc;

use tracing::info;

use crate::repository::{EmbeddingsRepository, SimilarityQuery};
use crate::AutoembedError;

/// Neighbors returned when the caller does not ask for a count.
pub const DEFAULT_RECOMMENDATIONS: usize = 10;

pub struct RecommendationService {
    embeddings: Arc<EmbeddingsRepository>,
}

impl RecommendationService {
    pub fn new(embeddings: Arc<EmbeddingsRepository>) -> Self {
        Self { embeddings }
    }

    /// Ids of the `n` entities closest to `id`, best first, never `id` itself.
    ///
    /// Fails with `NotFound` when `id` has no stored embedding.
    pub async fn ask(&self, id: &str, n: usize) -> Result<Vec<String>, AutoembedError> {
        info!("Asking for {} recommendations for {}", n, id);
        self.embeddings
            .get_most_similar(&SimilarityQuery::ById(id.to_string()), n)
            .await
    }
}
