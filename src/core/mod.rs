

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod resilience;
pub mod strategy;

pub use cache::{EmbeddingCache, LazyIndexCache};
pub use config::{CrossDomainConfig, DomainConfig, GraphConfig, RagConfig};
pub use error::{RagError, Result};
pub use models::{
    CollectionKey, KnowledgeEntry, KnowledgeLevel, Provenance, Relation, ResultKey, SearchResult,
    sort_by_score_desc,
};
pub use resilience::{RetryPolicy, degrade};
pub use strategy::{LatencyTier, Strategy, StrategyCost};
