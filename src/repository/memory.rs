use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::vector_store::{ScoredId, VectorStore};
use crate::models::Embedding;
use crate::utils::math::cosine_similarity;
use crate::AutoembedError;

/// In-memory vector store using cosine similarity.
///
/// Entries are kept ordered by id, which gives pages the same order as the
/// SurrealDB backend.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<BTreeMap<String, Embedding>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_embeddings(embeddings: Vec<Embedding>) -> Self {
        let store = Self::new();
        {
            let mut entries = store.entries.write().await;
            for embedding in embeddings {
                entries.insert(embedding.id.clone(), embedding);
            }
        }
        store
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn get(&self, ids: &[String]) -> Result<Vec<Embedding>, AutoembedError> {
        let entries = self.entries.read().await;
        Ok(ids.iter().filter_map(|id| entries.get(id).cloned()).collect())
    }

    async fn count(&self) -> Result<usize, AutoembedError> {
        Ok(self.entries.read().await.len())
    }

    async fn get_page(&self, limit: usize, offset: usize) -> Result<Vec<Embedding>, AutoembedError> {
        let entries = self.entries.read().await;
        Ok(entries.values().skip(offset).take(limit).cloned().collect())
    }

    async fn query(&self, vector: &[f32], n: usize) -> Result<Vec<ScoredId>, AutoembedError> {
        let entries = self.entries.read().await;
        let mut scored = Vec::with_capacity(entries.len());
        for embedding in entries.values() {
            if embedding.vector.len() != vector.len() {
                return Err(AutoembedError::ShapeMismatch {
                    expected: embedding.vector.len(),
                    actual: vector.len(),
                });
            }
            scored.push(ScoredId {
                id: embedding.id.clone(),
                score: cosine_similarity(vector, &embedding.vector),
            });
        }

        // Score descending, then id ascending for a stable order
        scored.sort_by(|a, b| match b.score.partial_cmp(&a.score) {
            Some(std::cmp::Ordering::Equal) | None => a.id.cmp(&b.id),
            Some(ordering) => ordering,
        });
        scored.truncate(n);
        Ok(scored)
    }

    async fn upsert(&self, embeddings: &[Embedding]) -> Result<(), AutoembedError> {
        let mut entries = self.entries.write().await;
        for embedding in embeddings {
            entries.insert(embedding.id.clone(), embedding.clone());
        }
        Ok(())
    }
}
