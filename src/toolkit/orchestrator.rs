

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::graph::GraphBuildReport;
use super::registry::ServiceRegistry;
use super::router::QueryContext;
use super::search::{SearchCache, SearchCacheStats};
use crate::core::error::{RagError, Result};
use crate::core::models::{CollectionKey, KnowledgeEntry, SearchResult};
use crate::core::strategy::Strategy;
use crate::db::{DeleteSelector, StoreError, VectorRecord};


#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub entities: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = Some(entities.into_iter().map(Into::into).collect());
        self
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub strategy: Strategy,
    pub context: QueryContext,
    pub elapsed_ms: u64,
}


#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub entities_built: usize,
    pub relations_built: usize,
    pub documents_indexed: usize,
}


/// Owns the background graph build started by [`RetrievalOrchestrator::index`].
/// Dropping the handle (or calling `detach`) lets the build run to completion.
pub struct IndexHandle {
    pub job_id: Uuid,
    pub collection: CollectionKey,
    pub documents_indexed: usize,
    task: JoinHandle<Result<GraphBuildReport>>,
}

impl IndexHandle {
    pub async fn wait(self) -> Result<GraphBuildReport> {
        match self.task.await {
            Ok(report) => report,
            Err(e) if e.is_cancelled() => Err(RagError::unavailable(
                "graph builder",
                format!("build {} for {} was aborted", self.job_id, self.collection),
            )),
            Err(e) => Err(RagError::unavailable("graph builder", e)),
        }
    }

    pub fn detach(self) {
        debug!("Graph build {} for {} detached", self.job_id, self.collection);
    }

    pub fn abort(&self) {
        warn!("Aborting graph build {} for {}", self.job_id, self.collection);
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}


pub struct RetrievalOrchestrator {
    services: Arc<ServiceRegistry>,
    cache: Arc<SearchCache<SearchOutcome>>,
}

impl RetrievalOrchestrator {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        let cache = Arc::new(SearchCache::new(
            services.config.search_cache_size,
            services.config.search_cache_ttl,
        ));
        Self { services, cache }
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn classify(&self, query: &str) -> QueryContext {
        self.services.classifier.classify(query)
    }

    /// Classification plus the planned strategy for `primary_domain`.
    pub fn plan(&self, query: &str, primary_domain: &str) -> (QueryContext, Strategy) {
        let ctx = self.classify(query);
        let strategy = self
            .services
            .planner
            .plan(query, &ctx, primary_domain, self.services.config.enable_cross_domain);
        (ctx, strategy)
    }

    pub async fn search(&self, request: SearchRequest) -> SearchOutcome {
        let started = Instant::now();
        let config = &self.services.config;
        let query = request.query.trim();

        let domains = if request.domains.is_empty() {
            vec![config.default_domain.clone()]
        } else {
            request.domains.clone()
        };
        let primary = domains[0].as_str();
        let top_k = request.top_k.filter(|k| *k > 0).unwrap_or(config.default_top_k);

        let (context, strategy) = match request.strategy {
            Some(strategy) => (self.classify(query), strategy),
            None => self.plan(query, primary),
        };

        let cache_key = Self::cache_key(query, strategy, &domains, &request, top_k);
        if let Some(mut cached) = self.cache.get(&cache_key) {
            debug!("Search cache hit for '{}'", crate::safe_truncate(query, 40));
            cached.elapsed_ms = started.elapsed().as_millis() as u64;
            return cached;
        }

        let categories = request.categories.as_deref();
        let entities = request
            .entities
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(context.entities.as_slice());

        let results = match strategy {
            Strategy::HybridVector => self.services.hybrid.search(query, &domains, categories, top_k).await,
            Strategy::GraphLocal => {
                self.services
                    .graph_retriever
                    .local_search(query, Some(entities), &domains, categories, top_k)
                    .await
            }
            Strategy::GraphGlobal => self.services.graph_retriever.global_search(query, &domains, top_k).await,
            Strategy::CrossType => {
                let targets = (domains.len() > 1).then_some(domains.as_slice());
                self.services.cross_domain.search(query, primary, targets, top_k).await
            }
        };

        let outcome = SearchOutcome {
            results,
            strategy,
            context,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "Search '{}' via {} over {:?}: {} results in {}ms",
            crate::safe_truncate(query, 40),
            strategy,
            domains,
            outcome.results.len(),
            outcome.elapsed_ms
        );

        self.cache.set(&cache_key, outcome.clone());
        outcome
    }

    fn cache_key(query: &str, strategy: Strategy, domains: &[String], request: &SearchRequest, top_k: usize) -> String {
        let domains = domains.join(",");
        let categories = request.categories.as_ref().map(|c| c.join(",")).unwrap_or_default();
        let entities = request.entities.as_ref().map(|e| e.join(",")).unwrap_or_default();
        let top_k = top_k.to_string();
        SearchCache::<SearchOutcome>::make_key([
            query,
            strategy.as_str(),
            domains.as_str(),
            categories.as_str(),
            entities.as_str(),
            top_k.as_str(),
        ])
    }

    pub fn cache_stats(&self) -> SearchCacheStats {
        self.cache.stats()
    }

    /// Replace the collection's vectors and keyword index with `entries`, then
    /// start the graph build in the background.
    pub async fn index(&self, domain: &str, category: &str, entries: Vec<KnowledgeEntry>) -> Result<IndexHandle> {
        let collection = CollectionKey::new(domain, category);
        let entries: Vec<KnowledgeEntry> = entries
            .into_iter()
            .filter(|e| !e.content.trim().is_empty())
            .map(|mut e| {
                e.domain = collection.domain.clone();
                e.category = collection.category.clone();
                e
            })
            .collect();

        let documents_indexed = self.index_documents(&collection, &entries).await?;
        self.cache.clear();

        let job_id = Uuid::new_v4();
        let builder = Arc::clone(&self.services.graph_builder);
        let cache = Arc::clone(&self.cache);
        let build_key = collection.clone();
        let task = tokio::spawn(async move {
            let result = builder.build(&build_key, &entries).await;
            // searches made while the build ran saw the old communities
            cache.clear();
            match &result {
                Ok(report) => info!("Graph build {} for {} finished: {:?}", job_id, build_key, report),
                Err(e) => warn!("Graph build {} for {} failed: {}", job_id, build_key, e),
            }
            result
        });

        info!(
            "Indexed {} documents into {}, graph build {} started",
            documents_indexed, collection, job_id
        );

        Ok(IndexHandle {
            job_id,
            collection,
            documents_indexed,
            task,
        })
    }

    pub async fn index_and_build(
        &self,
        domain: &str,
        category: &str,
        entries: Vec<KnowledgeEntry>,
    ) -> Result<IndexSummary> {
        let handle = self.index(domain, category, entries).await?;
        let documents_indexed = handle.documents_indexed;
        let report = handle.wait().await?;

        Ok(IndexSummary {
            entities_built: report.entities,
            relations_built: report.relations,
            documents_indexed,
        })
    }

    async fn index_documents(&self, collection: &CollectionKey, entries: &[KnowledgeEntry]) -> Result<usize> {
        let services = &self.services;
        let retry = &services.config.retry;
        let vector_store = &services.collaborators.vector_store;

        let texts: Vec<String> = entries.iter().map(|e| e.content.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            retry
                .run("embedding", || services.collaborators.embedder.embed(&texts))
                .await?
        };
        if embeddings.len() != entries.len() {
            return Err(StoreError::LengthMismatch {
                records: entries.len(),
                embeddings: embeddings.len(),
            }
            .into());
        }

        let records: Vec<VectorRecord> = entries
            .iter()
            .zip(embeddings)
            .map(|(entry, embedding)| VectorRecord::from_entry(entry, embedding))
            .collect();

        let previous = retry.run("vector store", || vector_store.ids(collection)).await?;

        let upserted = retry
            .run("vector store", || vector_store.upsert(collection, records.clone()))
            .await?;

        let stale: Vec<String> = previous
            .into_iter()
            .filter(|id| !entries.iter().any(|e| &e.id == id))
            .collect();
        if !stale.is_empty() {
            let removed = retry
                .run("vector store", || {
                    vector_store.delete(collection, DeleteSelector::Ids(stale.clone()))
                })
                .await?;
            debug!("Removed {} stale vectors from {}", removed, collection);
        }

        retry
            .run("keyword index", || services.collaborators.keyword_index.build(collection, entries))
            .await?;

        Ok(upserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Provenance;
    use crate::db::VectorStore;
    use crate::toolkit::router::QueryType;
    use crate::toolkit::testing::{Fixture, FullVectorStore, ScriptedExtractor, corpus, entry, test_config};

    async fn orchestrator(fixture: &Fixture) -> RetrievalOrchestrator {
        let registry = ServiceRegistry::new(test_config(), fixture.collaborators(Arc::new(ScriptedExtractor::new())))
            .unwrap();
        RetrievalOrchestrator::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_basic_concept_goes_hybrid() {
        let fixture = Fixture::new().await;
        let orchestrator = orchestrator(&fixture).await;

        let outcome = orchestrator
            .search(SearchRequest::new("帝王是什么意思").domains(["ziwei"]).top_k(3))
            .await;
        assert_eq!(outcome.context.query_type, QueryType::BasicConcept);
        assert_eq!(outcome.strategy, Strategy::HybridVector);
        assert!(!outcome.results.is_empty());
        assert!(outcome.results.len() <= 3);
    }

    #[tokio::test]
    async fn test_shared_concept_goes_cross_domain() {
        let fixture = Fixture::new().await;
        let orchestrator = orchestrator(&fixture).await;

        let outcome = orchestrator.search(SearchRequest::new("紫微星的五行属性")).await;
        assert_eq!(outcome.strategy, Strategy::CrossType);
        assert!(outcome.results.iter().any(|r| r.provenance == Provenance::Shared));
    }

    #[tokio::test]
    async fn test_explicit_strategy_is_honoured() {
        let fixture = Fixture::new().await;
        let orchestrator = orchestrator(&fixture).await;

        let outcome = orchestrator
            .search(
                SearchRequest::new("紫微")
                    .domains(["ziwei"])
                    .strategy(Strategy::GraphLocal)
                    .entities(["天府"]),
            )
            .await;
        assert_eq!(outcome.strategy, Strategy::GraphLocal);
        assert!(outcome.results.iter().all(|r| r.provenance == Provenance::Graph));
    }

    #[tokio::test]
    async fn test_repeat_search_hits_cache() {
        let fixture = Fixture::new().await;
        let orchestrator = orchestrator(&fixture).await;
        let request = SearchRequest::new("天府星").domains(["ziwei"]);

        let first = orchestrator.search(request.clone()).await;
        let calls = fixture.embedder.calls();
        let second = orchestrator.search(request).await;

        assert_eq!(first.results, second.results);
        assert_eq!(fixture.embedder.calls(), calls);
        assert_eq!(orchestrator.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_index_and_build() {
        let fixture = Fixture::empty();
        let orchestrator = orchestrator(&fixture).await;
        let entries: Vec<_> = corpus().into_iter().filter(|e| e.category == "star").collect();

        let summary = orchestrator.index_and_build("ziwei", "star", entries).await.unwrap();
        assert_eq!(summary.documents_indexed, 3);
        assert!(summary.entities_built >= 5);

        let outcome = orchestrator
            .search(SearchRequest::new("天府星").domains(["ziwei"]).categories(["star"]))
            .await;
        assert_eq!(outcome.results[0].id, "z2");
    }

    #[tokio::test]
    async fn test_reindex_replaces_collection_and_clears_cache() {
        let fixture = Fixture::empty();
        let orchestrator = orchestrator(&fixture).await;
        let key = CollectionKey::new("bazi", "yongshen");

        let first = vec![entry("bazi", "yongshen", "y1", "用神", "用神是八字中最需要的五行")];
        orchestrator.index_and_build("bazi", "yongshen", first).await.unwrap();
        let request = SearchRequest::new("喜神").domains(["bazi"]).strategy(Strategy::HybridVector);
        orchestrator.search(request.clone()).await;

        let second = vec![entry("bazi", "yongshen", "y2", "喜神", "喜神生扶用神")];
        let handle = orchestrator.index("bazi", "yongshen", second).await.unwrap();
        assert_eq!(handle.documents_indexed, 1);
        handle.wait().await.unwrap();

        assert_eq!(fixture.vectors.count(&key).await.unwrap(), 1);

        let outcome = orchestrator.search(request).await;
        assert_eq!(orchestrator.cache_stats().hits, 0);
        assert_eq!(outcome.results[0].id, "y2");
    }

    #[tokio::test]
    async fn test_aborted_build_reports_unavailable() {
        let fixture = Fixture::empty();
        let orchestrator = orchestrator(&fixture).await;

        let handle = orchestrator.index("ziwei", "star", corpus()).await.unwrap();
        handle.abort();
        match handle.wait().await {
            Err(e) => assert!(e.is_transient()),
            Ok(report) => assert_eq!(report.documents, 8),
        }
    }

    #[tokio::test]
    async fn test_global_search_after_build_sees_new_communities() {
        let fixture = Fixture::empty();
        let orchestrator = orchestrator(&fixture).await;
        let entries: Vec<_> = corpus().into_iter().filter(|e| e.category == "star").collect();
        let request = SearchRequest::new("紫微星")
            .domains(["ziwei"])
            .strategy(Strategy::GraphGlobal);

        let handle = orchestrator.index("ziwei", "star", entries).await.unwrap();
        orchestrator.search(request.clone()).await;
        let report = handle.wait().await.unwrap();
        assert!(report.communities > 0);

        let outcome = orchestrator.search(request).await;
        assert!(!outcome.results.is_empty());
        assert!(outcome.results.iter().all(|r| r.provenance == Provenance::Graph));
    }

    #[tokio::test]
    async fn test_failed_reindex_keeps_previous_documents() {
        let fixture = Fixture::empty();
        let orchestrator = orchestrator(&fixture).await;
        let key = CollectionKey::new("bazi", "yongshen");

        let first = vec![entry("bazi", "yongshen", "y1", "用神", "用神是八字中最需要的五行")];
        orchestrator.index_and_build("bazi", "yongshen", first).await.unwrap();

        let mut collaborators = fixture.collaborators(Arc::new(ScriptedExtractor::new()));
        collaborators.vector_store = Arc::new(FullVectorStore {
            inner: fixture.vectors.clone(),
        });
        let refusing = RetrievalOrchestrator::new(Arc::new(ServiceRegistry::new(test_config(), collaborators).unwrap()));

        let second = vec![entry("bazi", "yongshen", "y2", "喜神", "喜神生扶用神")];
        assert!(refusing.index("bazi", "yongshen", second).await.is_err());

        assert_eq!(fixture.vectors.ids(&key).await.unwrap(), vec!["y1".to_string()]);
        let outcome = orchestrator
            .search(SearchRequest::new("用神").domains(["bazi"]).strategy(Strategy::HybridVector))
            .await;
        assert!(outcome.results.iter().any(|r| r.id == "y1"));
        assert!(outcome.results.iter().all(|r| r.id != "y2"));
    }
}
