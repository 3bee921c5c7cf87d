

use std::sync::Arc;

use tracing::info;

use crate::core::config::RagConfig;
use crate::core::error::Result;
use crate::db::{GraphStore, KeywordIndex, VectorStore};
use crate::llm::{EmbeddingProvider, EntityExtractionProvider, GenerativeProvider, RerankProvider};
use crate::toolkit::graph::{CommunityCache, GraphBuilder, GraphRetriever};
use crate::toolkit::planner::StrategyPlanner;
use crate::toolkit::router::QueryClassifier;
use crate::toolkit::search::{CrossDomainRetriever, HybridRetriever};


/// External collaborators, supplied by the embedding application.
#[derive(Clone)]
pub struct Collaborators {
    pub vector_store: Arc<dyn VectorStore>,
    pub keyword_index: Arc<dyn KeywordIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub extractor: Arc<dyn EntityExtractionProvider>,
    pub graph_store: Arc<dyn GraphStore>,
    pub reranker: Option<Arc<dyn RerankProvider>>,
    pub generator: Option<Arc<dyn GenerativeProvider>>,
}


/// Every service, built once and shared by `Arc`.
pub struct ServiceRegistry {
    pub config: Arc<RagConfig>,
    pub collaborators: Collaborators,
    pub classifier: Arc<QueryClassifier>,
    pub planner: Arc<StrategyPlanner>,
    pub hybrid: Arc<HybridRetriever>,
    pub graph_retriever: Arc<GraphRetriever>,
    pub graph_builder: Arc<GraphBuilder>,
    pub cross_domain: Arc<CrossDomainRetriever>,
    pub communities: Arc<CommunityCache>,
}

impl ServiceRegistry {
    /// Validates the configuration and compiles routing rules; both are the
    /// only fatal failures of the pipeline.
    pub fn new(config: RagConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let classifier = Arc::new(QueryClassifier::from_config(&config)?);
        let planner = Arc::new(StrategyPlanner::from_config(&config, Arc::clone(&classifier)));
        let communities = Arc::new(CommunityCache::new());

        let hybrid = Arc::new(HybridRetriever::new(
            Arc::clone(&collaborators.vector_store),
            Arc::clone(&collaborators.keyword_index),
            Arc::clone(&collaborators.embedder),
            collaborators.reranker.clone(),
            Arc::clone(&config),
        ));

        let graph_retriever = Arc::new(GraphRetriever::new(
            Arc::clone(&hybrid),
            Arc::clone(&collaborators.graph_store),
            Arc::clone(&classifier),
            Arc::clone(&communities),
            Arc::clone(&config),
        ));

        let graph_builder = Arc::new(GraphBuilder::new(
            Arc::clone(&collaborators.extractor),
            Arc::clone(&collaborators.graph_store),
            Arc::clone(&communities),
            &config,
        ));

        let cross_domain = Arc::new(CrossDomainRetriever::new(Arc::clone(&hybrid), &config));

        info!(
            "Service registry ready: {} domains, reranker={}, generator={}",
            config.domains.len(),
            collaborators.reranker.is_some(),
            collaborators.generator.is_some()
        );

        Ok(Self {
            config,
            collaborators,
            classifier,
            planner,
            hybrid,
            graph_retriever,
            graph_builder,
            cross_domain,
            communities,
        })
    }
}
