pub mod embedding;
pub mod event;

pub use embedding::{Embedding, EmbeddingBatch};
pub use event::EventType;
