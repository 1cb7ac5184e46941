//! Incremental consumer embeddings driven by interaction events.
//!
//! A consumer vector starts as a copy of the first item the consumer touched
//! and then drifts towards every further item, weighted by how strong the
//! interaction was (see [`EventType::weight`]).

use std::sync::Arc;

use tracing::{error, info};

use crate::models::{Embedding, EventType};
use crate::repository::EmbeddingsRepository;
use crate::utils::math::weighted_add;
use crate::AutoembedError;

pub struct ConsumerEmbeddingUpdater {
    consumers: Arc<EmbeddingsRepository>,
    items: Arc<EmbeddingsRepository>,
}

impl ConsumerEmbeddingUpdater {
    pub fn new(consumers: Arc<EmbeddingsRepository>, items: Arc<EmbeddingsRepository>) -> Self {
        Self { consumers, items }
    }

    /// Fold one interaction into the consumer's vector and persist it.
    ///
    /// Returns the stored consumer embedding.
    pub async fn update_consumer_embedding(
        &self,
        consumer_id: &str,
        item_id: &str,
        event: &EventType,
    ) -> Result<Embedding, AutoembedError> {
        let item = self
            .items
            .get_embedding(item_id)
            .await?
            .ok_or_else(|| AutoembedError::not_found("item embedding", item_id))?;

        let Some(mut consumer) = self.consumers.get_embedding(consumer_id).await? else {
            info!(
                "No embedding for consumer {}, starting from item {}",
                consumer_id, item_id
            );
            let initial = Embedding::new(consumer_id, item.vector);
            self.consumers.update_embedding(&initial).await?;
            return Ok(initial);
        };

        if consumer.dim() != item.dim() {
            error!(
                "Item {} has dimension {} but consumer {} has dimension {}",
                item_id,
                item.dim(),
                consumer_id,
                consumer.dim()
            );
            return Err(AutoembedError::ShapeMismatch {
                expected: consumer.dim(),
                actual: item.dim(),
            });
        }

        let weight = event.weight();
        consumer.vector = weighted_add(&consumer.vector, &item.vector, weight);
        info!(
            "Updating consumer {} with item {} ({} event, weight {})",
            consumer_id, item_id, event, weight
        );
        self.consumers.update_embedding(&consumer).await?;
        Ok(consumer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryVectorStore;
    use pretty_assertions::assert_eq;

    async fn updater(items: Vec<Embedding>) -> (ConsumerEmbeddingUpdater, Arc<EmbeddingsRepository>) {
        let consumers = Arc::new(EmbeddingsRepository::new(Arc::new(InMemoryVectorStore::new())));
        let items = Arc::new(EmbeddingsRepository::new(Arc::new(
            InMemoryVectorStore::from_embeddings(items).await,
        )));
        (ConsumerEmbeddingUpdater::new(consumers.clone(), items), consumers)
    }

    #[tokio::test]
    async fn test_cold_start_copies_item() {
        let (updater, consumers) = updater(vec![Embedding::new("item", vec![0.25, -0.5, 1.0])]).await;
        let stored = updater
            .update_consumer_embedding("alice", "item", &EventType::Detail)
            .await
            .unwrap();
        assert_eq!(stored.vector, vec![0.25, -0.5, 1.0]);

        let persisted = consumers.get_embedding("alice").await.unwrap().unwrap();
        assert_eq!(persisted.vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_warm_update_adds_weighted_item() {
        let (updater, consumers) = updater(vec![
            Embedding::new("a", vec![1.0, 0.0]),
            Embedding::new("b", vec![0.0, 1.0]),
        ])
        .await;
        updater
            .update_consumer_embedding("alice", "a", &EventType::Listing)
            .await
            .unwrap();
        let updated = updater
            .update_consumer_embedding("alice", "b", &EventType::Contact)
            .await
            .unwrap();
        assert_eq!(updated.vector, vec![1.0, 0.6]);
        assert_eq!(
            consumers.get_embedding("alice").await.unwrap().unwrap().vector,
            vec![1.0, 0.6]
        );
    }

    #[tokio::test]
    async fn test_unknown_event_uses_weak_weight() {
        let (updater, _) = updater(vec![Embedding::new("a", vec![2.0])]).await;
        updater
            .update_consumer_embedding("bob", "a", &EventType::Detail)
            .await
            .unwrap();
        let updated = updater
            .update_consumer_embedding("bob", "a", &"share".parse::<EventType>().unwrap())
            .await
            .unwrap();
        assert!((updated.vector[0] - 2.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_item_is_not_found() {
        let (updater, consumers) = updater(vec![]).await;
        let err = updater
            .update_consumer_embedding("alice", "ghost", &EventType::Contact)
            .await
            .unwrap_err();
        assert!(matches!(err, AutoembedError::NotFound { .. }));
        assert!(consumers.get_embedding("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let (updater, consumers) = updater(vec![Embedding::new("a", vec![1.0, 2.0, 3.0])]).await;
        consumers
            .update_embedding(&Embedding::new("alice", vec![1.0, 1.0]))
            .await
            .unwrap();
        let err = updater
            .update_consumer_embedding("alice", "a", &EventType::Contact)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AutoembedError::ShapeMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }
}
