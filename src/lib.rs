

pub mod core;
pub mod db;
pub mod llm;
pub mod mcp;
pub mod toolkit;
pub mod utils;

pub use utils::{safe_truncate, safe_truncate_ellipsis, tokenize};


pub use core::config::RagConfig;
pub use core::error::{RagError, Result};
pub use core::models::{CollectionKey, KnowledgeEntry, ResultKey, SearchResult};
pub use core::strategy::Strategy;
pub use toolkit::orchestrator::{RetrievalOrchestrator, SearchOutcome, SearchRequest};
pub use toolkit::registry::{Collaborators, ServiceRegistry};


pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";


pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";


pub const DEFAULT_LLM_MODEL: &str = "qwen2.5:7b";


pub const DEFAULT_CACHE_SIZE: usize = 1000;


pub const DEFAULT_CACHE_TTL: u64 = 300;
