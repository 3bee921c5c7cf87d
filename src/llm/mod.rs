

pub mod embeddings;
pub mod extractor;
pub mod providers;
pub mod rerank;

pub use embeddings::{EmbeddingError, EmbeddingProvider, OllamaEmbeddings};
pub use extractor::{EntityExtractionProvider, ExtractedEntity, ExtractionOutput, LlmEntityExtractor};
pub use providers::{ChatTurn, GenerativeProvider, LlmMetadata, LlmProvider, LlmProviderError, OllamaProvider};
pub use rerank::{LlmReranker, RerankProvider};
