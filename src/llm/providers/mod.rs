

pub mod base;
pub mod ollama;

pub use base::{ChatTurn, GenerativeProvider, LlmMetadata, LlmProvider, LlmProviderError};
pub use ollama::OllamaProvider;
