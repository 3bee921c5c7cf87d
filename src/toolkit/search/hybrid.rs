

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::fusion::{RankedList, ScoreFusion};
use crate::core::config::RagConfig;
use crate::core::error::{RagError, Result};
use crate::core::models::{CollectionKey, Provenance, SearchResult, sort_by_score_desc};
use crate::core::resilience::{RetryPolicy, degrade};
use crate::db::{KeywordHit, KeywordIndex, VectorHit, VectorStore};
use crate::llm::{EmbeddingProvider, RerankProvider};


fn from_vector_hit(collection: &CollectionKey, hit: VectorHit) -> SearchResult {
    SearchResult {
        id: hit.id,
        content: hit.content,
        score: 1.0 - hit.distance,
        title: hit.metadata.title,
        domain: collection.domain.clone(),
        category: collection.category.clone(),
        level: hit.metadata.level,
        provenance: Provenance::Vector,
        distance: Some(hit.distance),
    }
}

fn from_keyword_hit(collection: &CollectionKey, hit: KeywordHit) -> SearchResult {
    SearchResult {
        id: hit.id,
        content: hit.content,
        score: hit.score,
        title: hit.title,
        domain: collection.domain.clone(),
        category: collection.category.clone(),
        level: hit.level,
        provenance: Provenance::Keyword,
        distance: None,
    }
}


/// Vector + keyword retrieval over a fixed, ordered set of collections.
pub struct HybridRetriever {
    vector_store: Arc<dyn VectorStore>,
    keyword_index: Arc<dyn KeywordIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankProvider>>,
    config: Arc<RagConfig>,
}

impl HybridRetriever {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        keyword_index: Arc<dyn KeywordIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn RerankProvider>>,
        config: Arc<RagConfig>,
    ) -> Self {
        Self {
            vector_store,
            keyword_index,
            embedder,
            reranker,
            config,
        }
    }

    fn retry(&self) -> &RetryPolicy {
        &self.config.retry
    }

    /// Domains in the given order; per domain the given categories, else the
    /// domain's configured categories, else the catch-all category.
    pub fn collections(&self, domains: &[String], categories: Option<&[String]>) -> Vec<CollectionKey> {
        domains
            .iter()
            .flat_map(|domain| {
                let categories = match categories {
                    Some(c) if !c.is_empty() => c.to_vec(),
                    _ => self.config.categories_for(domain),
                };
                categories
                    .into_iter()
                    .map(move |category| CollectionKey::new(domain.clone(), category))
            })
            .collect()
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let texts = [query.to_string()];
        let mut vectors = self
            .retry()
            .run("embedding", || self.embedder.embed(&texts))
            .await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::unavailable("embedding", "no vector returned"))
    }

    /// One vector per text, in input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .retry()
            .run("embedding", || self.embedder.embed(texts))
            .await?;
        if vectors.len() != texts.len() {
            return Err(RagError::unavailable(
                "embedding",
                format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            ));
        }
        Ok(vectors)
    }

    pub async fn vector_search(
        &self,
        collection: &CollectionKey,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let hits = self
            .retry()
            .run("vector store", || self.vector_store.query(collection, embedding, k, None))
            .await?;
        Ok(hits.into_iter().map(|h| from_vector_hit(collection, h)).collect())
    }

    pub async fn keyword_search(&self, collection: &CollectionKey, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let hits = self
            .retry()
            .run("keyword index", || self.keyword_index.query(collection, query, k))
            .await?;
        Ok(hits.into_iter().map(|h| from_keyword_hit(collection, h)).collect())
    }

    /// Vector search over each collection concurrently, concatenated in
    /// collection order. Failed collections contribute nothing.
    pub async fn vector_search_collections(
        &self,
        collections: &[CollectionKey],
        embedding: &[f32],
        k: usize,
    ) -> Vec<SearchResult> {
        let searches = collections.iter().map(|c| async move {
            degrade(self.vector_search(c, embedding, k).await, "vector search")
        });
        join_all(searches).await.into_iter().flatten().collect()
    }

    pub async fn search(
        &self,
        query: &str,
        domains: &[String],
        categories: Option<&[String]>,
        top_k: usize,
    ) -> Vec<SearchResult> {
        let embedding = match self.embed_query(query).await {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Query embedding failed, keyword results only: {}", e);
                None
            }
        };
        let collections = self.collections(domains, categories);
        self.search_embedded(query, embedding.as_deref(), &collections, top_k).await
    }

    /// Hybrid search with a precomputed query embedding (`None` skips the
    /// vector side).
    pub async fn search_embedded(
        &self,
        query: &str,
        embedding: Option<&[f32]>,
        collections: &[CollectionKey],
        top_k: usize,
    ) -> Vec<SearchResult> {
        let pool = top_k.saturating_mul(2).max(1);

        let per_collection = collections.iter().map(|collection| async move {
            let vector = async {
                match embedding {
                    Some(e) => degrade(self.vector_search(collection, e, pool).await, "vector search"),
                    None => Vec::new(),
                }
            };
            let keyword = async {
                degrade(self.keyword_search(collection, query, pool).await, "keyword search")
            };
            futures::join!(vector, keyword)
        });

        let (vector, keyword): (Vec<_>, Vec<_>) = join_all(per_collection).await.into_iter().unzip();
        let vector: Vec<SearchResult> = vector.into_iter().flatten().collect();
        let keyword: Vec<SearchResult> = keyword.into_iter().flatten().collect();

        debug!(
            "Hybrid over {} collections: {} vector, {} keyword candidates",
            collections.len(),
            vector.len(),
            keyword.len()
        );

        let fused = ScoreFusion::fuse(&[
            RankedList::new("vector", self.config.hybrid_vector_weight, vector),
            RankedList::new("keyword", self.config.hybrid_keyword_weight, keyword),
        ]);

        let mut results = self.rerank(query, fused, top_k).await;
        results.truncate(top_k);

        info!("Hybrid search returned {} results", results.len());
        results
    }

    async fn rerank(&self, query: &str, fused: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
        let Some(reranker) = &self.reranker else {
            return fused;
        };
        if fused.len() <= top_k {
            return fused;
        }

        let documents: Vec<String> = fused.iter().map(|r| r.content.clone()).collect();
        match self
            .retry()
            .run("reranker", || reranker.score(query, &documents))
            .await
        {
            Ok(scores) if scores.len() == fused.len() => {
                let mut reranked: Vec<SearchResult> = fused
                    .into_iter()
                    .zip(scores)
                    .map(|(r, s)| r.with_score(s))
                    .collect();
                sort_by_score_desc(&mut reranked);
                reranked
            }
            Ok(_) => {
                warn!("Reranker score count mismatch, keeping fused order");
                fused
            }
            Err(e) => {
                warn!("Reranker failed, keeping fused order: {}", e);
                fused
            }
        }
    }
}
