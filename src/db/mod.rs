

pub mod graph_store;
pub mod keyword;
pub mod vector;

use thiserror::Error;

use crate::core::error::RagError;
use crate::core::models::CollectionKey;

pub use graph_store::{GraphStore, JsonGraphStore, MemoryGraphStore};
pub use keyword::{Bm25Index, KeywordHit, KeywordIndex};
pub use vector::{DeleteSelector, MemoryVectorStore, MetadataFilter, VectorHit, VectorRecord, VectorStore};


#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(CollectionKey),
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Record/embedding count mismatch: {records} records, {embeddings} embeddings")]
    LengthMismatch { records: usize, embeddings: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for RagError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CollectionNotFound(key) => RagError::CollectionNotFound(key),
            StoreError::Io(e) => RagError::Io(e),
            StoreError::Serialization(e) => RagError::Serialization(e),
            other => RagError::unavailable("store", other),
        }
    }
}
