use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// A stored vector with its identifier and free-form metadata.
///
/// Identity is the `id`; writing an embedding with an existing id replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Embedding {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }
}

/// Ordered collection of embeddings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingBatch {
    embeddings: Vec<Embedding>,
}

impl EmbeddingBatch {
    pub fn new(embeddings: Vec<Embedding>) -> Self {
        Self { embeddings }
    }

    pub fn push(&mut self, embedding: Embedding) {
        self.embeddings.push(embedding);
    }

    pub fn extend(&mut self, embeddings: impl IntoIterator<Item = Embedding>) {
        self.embeddings.extend(embeddings);
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Embedding> {
        self.embeddings.iter()
    }

    pub fn as_slice(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub fn ids(&self) -> Vec<&str> {
        self.embeddings.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn into_inner(self) -> Vec<Embedding> {
        self.embeddings
    }

    /// Random subset of `n` embeddings without replacement.
    ///
    /// Asking for more than the batch holds returns every embedding in a
    /// shuffled order.
    pub fn sample(&self, n: usize, seed: u64) -> EmbeddingBatch {
        let mut rng = StdRng::seed_from_u64(seed);
        if n >= self.embeddings.len() {
            if n > self.embeddings.len() {
                warn!(
                    "Requested {} samples from a batch of {}, returning the whole batch",
                    n,
                    self.embeddings.len()
                );
            }
            let mut all = self.embeddings.clone();
            all.shuffle(&mut rng);
            return EmbeddingBatch::new(all);
        }

        let picked = rand::seq::index::sample(&mut rng, self.embeddings.len(), n);
        EmbeddingBatch::new(
            picked
                .into_iter()
                .map(|i| self.embeddings[i].clone())
                .collect(),
        )
    }
}

impl FromIterator<Embedding> for EmbeddingBatch {
    fn from_iter<I: IntoIterator<Item = Embedding>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for EmbeddingBatch {
    type Item = Embedding;
    type IntoIter = std::vec::IntoIter<Embedding>;

    fn into_iter(self) -> Self::IntoIter {
        self.embeddings.into_iter()
    }
}

impl<'a> IntoIterator for &'a EmbeddingBatch {
    type Item = &'a Embedding;
    type IntoIter = std::slice::Iter<'a, Embedding>;

    fn into_iter(self) -> Self::IntoIter {
        self.embeddings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn batch(n: usize) -> EmbeddingBatch {
        (0..n)
            .map(|i| Embedding::new(format!("e{i}"), vec![i as f32, 1.0]))
            .collect()
    }

    #[test]
    fn test_sample_without_replacement() {
        let sampled = batch(50).sample(10, 7);
        assert_eq!(sampled.len(), 10);
        let unique: HashSet<&str> = sampled.ids().into_iter().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_sample_is_reproducible_per_seed() {
        let b = batch(50);
        assert_eq!(b.sample(10, 3), b.sample(10, 3));
    }

    #[test]
    fn test_sample_more_than_available_returns_everything() {
        let sampled = batch(5).sample(20, 1);
        assert_eq!(sampled.len(), 5);
        let unique: HashSet<&str> = sampled.ids().into_iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_sample_empty_batch() {
        assert!(EmbeddingBatch::default().sample(3, 0).is_empty());
    }

    #[test]
    fn test_metadata_defaults_when_absent() {
        let e: Embedding = serde_json::from_str(r#"{"id":"x","vector":[1.0]}"#).unwrap();
        assert!(e.metadata.is_empty());
        assert_eq!(e.dim(), 1);
    }
}
