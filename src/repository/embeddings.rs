//! Embeddings repository: chunked writes, paged scans and neighbor lookups
//! on top of a [`VectorStore`].

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::vector_store::VectorStore;
use crate::error::ChunkFailure;
use crate::models::{Embedding, EmbeddingBatch};
use crate::services::progress::{noop_progress, ProgressReporter};
use crate::AutoembedError;

/// Largest number of embeddings sent to the store in one upsert call.
pub const MAX_UPSERT_BATCH_SIZE: usize = 5460;

/// Page size of a full-collection scan.
pub const SCAN_PAGE_SIZE: usize = 5000;

/// What a full scan does when a page cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPolicy {
    /// Log the failed page, record it in the report and keep scanning.
    #[default]
    BestEffort,
    /// Abort on the first failed page.
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPage {
    pub offset: usize,
    pub limit: usize,
    pub message: String,
}

/// Outcome of a full scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// Collection size reported by the store before the scan.
    pub expected: usize,
    pub pages_read: usize,
    pub skipped: Vec<SkippedPage>,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Reference point of a similarity query.
#[derive(Debug, Clone)]
pub enum SimilarityQuery {
    /// Look up the stored vector of this id first.
    ById(String),
    ByEmbedding(Embedding),
}

impl SimilarityQuery {
    fn id(&self) -> &str {
        match self {
            SimilarityQuery::ById(id) => id,
            SimilarityQuery::ByEmbedding(embedding) => &embedding.id,
        }
    }
}

pub struct EmbeddingsRepository {
    store: Arc<dyn VectorStore>,
    max_batch_size: usize,
    page_size: usize,
    progress: Arc<dyn ProgressReporter>,
}

impl EmbeddingsRepository {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            max_batch_size: MAX_UPSERT_BATCH_SIZE,
            page_size: SCAN_PAGE_SIZE,
            progress: noop_progress(),
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Contiguous chunk bounds covering `0..len`, each at most `max_batch_size` long.
    pub fn chunk_ranges(&self, len: usize) -> Vec<Range<usize>> {
        (0..len)
            .step_by(self.max_batch_size)
            .map(|start| start..(start + self.max_batch_size).min(len))
            .collect()
    }

    /// Write one chunk. Rejects chunks larger than the batch limit.
    pub async fn upsert_chunk(&self, chunk: &[Embedding]) -> Result<(), AutoembedError> {
        if chunk.len() > self.max_batch_size {
            return Err(AutoembedError::Validation(format!(
                "chunk of {} embeddings exceeds the limit of {}",
                chunk.len(),
                self.max_batch_size
            )));
        }
        self.store.upsert(chunk).await
    }

    /// Upsert a batch in order, chunk by chunk.
    ///
    /// A failed chunk does not stop later chunks and earlier chunks stay
    /// written; all failures are returned together as `PartialBatchFailure`.
    pub async fn update_batch(&self, batch: &EmbeddingBatch) -> Result<(), AutoembedError> {
        let items = batch.as_slice();
        let ranges = self.chunk_ranges(items.len());
        let total_chunks = ranges.len();
        info!(
            "Upserting {} embeddings in {} chunk(s) of at most {}",
            items.len(),
            total_chunks,
            self.max_batch_size
        );

        self.progress.begin(total_chunks, "upserting embeddings").await;
        let mut failures = Vec::new();
        for (index, range) in ranges.into_iter().enumerate() {
            let offset = range.start;
            let len = range.len();
            match self.upsert_chunk(&items[range]).await {
                Ok(()) => debug!("Upserted chunk {}/{} ({} items)", index + 1, total_chunks, len),
                Err(e) => {
                    error!("Chunk {}/{} failed: {}", index + 1, total_chunks, e);
                    failures.push(ChunkFailure {
                        index,
                        offset,
                        len,
                        message: e.to_string(),
                    });
                }
            }
            self.progress
                .step(index + 1, total_chunks, "upserting embeddings")
                .await;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AutoembedError::PartialBatchFailure {
                total_chunks,
                failures,
            })
        }
    }

    pub async fn update_embedding(&self, embedding: &Embedding) -> Result<(), AutoembedError> {
        self.store.upsert(std::slice::from_ref(embedding)).await
    }

    pub async fn get_embedding(&self, id: &str) -> Result<Option<Embedding>, AutoembedError> {
        let mut found = self.store.get(&[id.to_string()]).await?;
        Ok(found.pop())
    }

    pub async fn get_embeddings_batch(&self, ids: &[String]) -> Result<EmbeddingBatch, AutoembedError> {
        Ok(EmbeddingBatch::new(self.store.get(ids).await?))
    }

    /// Read the whole collection page by page.
    pub async fn get_all_embeddings(
        &self,
        policy: ScanPolicy,
    ) -> Result<(EmbeddingBatch, ScanReport), AutoembedError> {
        let expected = self.store.count().await?;
        let offsets: Vec<usize> = (0..expected).step_by(self.page_size).collect();
        info!(
            "Scanning {} embeddings in {} page(s) of {}",
            expected,
            offsets.len(),
            self.page_size
        );

        let mut batch = EmbeddingBatch::default();
        let mut report = ScanReport {
            expected,
            ..Default::default()
        };

        self.progress.begin(offsets.len(), "reading embeddings").await;
        for (i, &offset) in offsets.iter().enumerate() {
            match self.store.get_page(self.page_size, offset).await {
                Ok(page) => {
                    batch.extend(page);
                    report.pages_read += 1;
                }
                Err(e) => match policy {
                    ScanPolicy::Strict => {
                        error!("Page at offset {} failed, aborting scan: {}", offset, e);
                        return Err(e);
                    }
                    ScanPolicy::BestEffort => {
                        warn!("Skipping page at offset {}: {}", offset, e);
                        report.skipped.push(SkippedPage {
                            offset,
                            limit: self.page_size,
                            message: e.to_string(),
                        });
                    }
                },
            }
            self.progress
                .step(i + 1, offsets.len(), "reading embeddings")
                .await;
        }

        if !report.is_complete() {
            warn!(
                "Scan finished with {} skipped page(s); {} of {} embeddings read",
                report.skipped.len(),
                batch.len(),
                expected
            );
        }
        Ok((batch, report))
    }

    /// Up to `n` neighbor ids, best first, never including the query's own id.
    pub async fn get_most_similar(
        &self,
        query: &SimilarityQuery,
        n: usize,
    ) -> Result<Vec<String>, AutoembedError> {
        let vector = match query {
            SimilarityQuery::ById(id) => {
                self.get_embedding(id)
                    .await?
                    .ok_or_else(|| AutoembedError::not_found("embedding", id.clone()))?
                    .vector
            }
            SimilarityQuery::ByEmbedding(embedding) => embedding.vector.clone(),
        };
        if n == 0 {
            return Ok(Vec::new());
        }

        let own_id = query.id();
        let neighbors = self.store.query(&vector, n.saturating_add(1)).await?;
        Ok(neighbors
            .into_iter()
            .map(|s| s.id)
            .filter(|id| id != own_id)
            .take(n)
            .collect())
    }
}
