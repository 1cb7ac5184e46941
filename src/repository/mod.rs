pub mod embeddings;
pub mod memory;
pub mod vector_store;

pub use embeddings::{
    EmbeddingsRepository, ScanPolicy, ScanReport, SimilarityQuery, SkippedPage,
    MAX_UPSERT_BATCH_SIZE, SCAN_PAGE_SIZE,
};
pub use memory::InMemoryVectorStore;
pub use vector_store::{ScoredId, SurrealVectorStore, VectorStore};
