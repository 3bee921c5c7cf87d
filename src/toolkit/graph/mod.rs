

pub mod builder;
pub mod models;
pub mod retriever;

pub use builder::{CommunityCache, GraphBuildReport, GraphBuilder};
pub use models::{Community, Entity, KnowledgeGraph};
pub use retriever::{GraphRetriever, community_overlap};
