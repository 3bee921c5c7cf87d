

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::builder::CommunityCache;
use super::models::Community;
use crate::core::config::RagConfig;
use crate::core::error::Result;
use crate::core::models::{CollectionKey, Provenance, ResultKey, SearchResult, sort_by_score_desc};
use crate::core::resilience::degrade;
use crate::db::GraphStore;
use crate::toolkit::router::QueryClassifier;
use crate::toolkit::search::HybridRetriever;
use crate::utils::tokenize;


/// Share of the query's distinct tokens that also occur in the community text.
pub fn community_overlap(query: &str, community: &Community) -> f64 {
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let community_tokens: HashSet<String> = tokenize(&community.match_text()).into_iter().collect();
    let overlap = query_tokens.intersection(&community_tokens).count();
    overlap as f64 / query_tokens.len() as f64
}


/// Union keyed by `ResultKey`, keeping the highest score seen for each key.
fn union_keep_max(results: impl IntoIterator<Item = SearchResult>) -> Vec<SearchResult> {
    let mut slots: HashMap<ResultKey, usize> = HashMap::new();
    let mut merged: Vec<SearchResult> = Vec::new();

    for result in results {
        match slots.get(&result.key()) {
            Some(&i) => {
                if result.score > merged[i].score {
                    merged[i] = result;
                }
            }
            None => {
                slots.insert(result.key(), merged.len());
                merged.push(result);
            }
        }
    }

    sort_by_score_desc(&mut merged);
    merged
}


pub struct GraphRetriever {
    hybrid: Arc<HybridRetriever>,
    store: Arc<dyn GraphStore>,
    classifier: Arc<QueryClassifier>,
    communities: Arc<CommunityCache>,
    config: Arc<RagConfig>,
}

impl GraphRetriever {
    pub fn new(
        hybrid: Arc<HybridRetriever>,
        store: Arc<dyn GraphStore>,
        classifier: Arc<QueryClassifier>,
        communities: Arc<CommunityCache>,
        config: Arc<RagConfig>,
    ) -> Self {
        Self {
            hybrid,
            store,
            classifier,
            communities,
            config,
        }
    }

    /// Entity-neighbourhood search. Without entities this is exactly the
    /// hybrid search over the same targets.
    pub async fn local_search(
        &self,
        query: &str,
        entities: Option<&[String]>,
        domains: &[String],
        categories: Option<&[String]>,
        top_k: usize,
    ) -> Vec<SearchResult> {
        let entities: Vec<String> = match entities {
            Some(given) if !given.is_empty() => given.to_vec(),
            _ => self.classifier.dictionary().extract(query),
        };

        if entities.is_empty() {
            debug!("No entities in query, local search falls back to hybrid");
            return self.hybrid.search(query, domains, categories, top_k).await;
        }

        let embeddings = match self.hybrid.embed_texts(&entities).await {
            Ok(e) => e,
            Err(e) => {
                warn!("Entity embedding failed, local search falls back to hybrid: {}", e);
                return self.hybrid.search(query, domains, categories, top_k).await;
            }
        };

        let collections = self.hybrid.collections(domains, categories);
        let per_entity = embeddings
            .iter()
            .map(|embedding| self.hybrid.vector_search_collections(&collections, embedding, top_k));

        let mut results = union_keep_max(
            join_all(per_entity)
                .await
                .into_iter()
                .flatten()
                .map(|r| r.with_provenance(Provenance::Graph)),
        );
        results.truncate(top_k);

        info!(
            "Local graph search over {} entities returned {} results",
            entities.len(),
            results.len()
        );
        results
    }

    /// Community-summary search.
    pub async fn global_search(&self, query: &str, domains: &[String], top_k: usize) -> Vec<SearchResult> {
        let embedding = match self.hybrid.embed_query(query).await {
            Ok(e) => e,
            Err(e) => {
                warn!("Query embedding failed, global search returns nothing: {}", e);
                return Vec::new();
            }
        };

        let per_domain = domains.iter().map(|domain| {
            let embedding = embedding.as_slice();
            async move {
                let communities = degrade(self.load_communities(domain).await, "community load");
                let selected = self.select_communities(query, &communities);
                debug!("{} communities selected in '{}'", selected.len(), domain);

                let searches = selected.into_iter().map(|community| {
                    let category = community
                        .category
                        .clone()
                        .unwrap_or_else(|| self.config.catch_all_category.clone());
                    let collection = CollectionKey::new(domain.clone(), category);
                    async move {
                        degrade(
                            self.hybrid.vector_search(&collection, embedding, top_k).await,
                            "community search",
                        )
                    }
                });
                join_all(searches).await.into_iter().flatten().collect::<Vec<_>>()
            }
        });

        let mut results = union_keep_max(
            join_all(per_domain)
                .await
                .into_iter()
                .flatten()
                .map(|r| r.with_provenance(Provenance::Graph)),
        );
        results.truncate(top_k);

        info!("Global graph search returned {} results", results.len());
        results
    }

    /// Communities of every collection in the domain, in category order.
    /// Each collection is loaded at most once until its graph is rebuilt.
    pub async fn load_communities(&self, domain: &str) -> Result<Vec<Community>> {
        let mut all = Vec::new();
        for category in self.config.categories_for(domain) {
            let key = CollectionKey::new(domain, category);
            let loaded = self
                .communities
                .get_or_try_build(&key, || async {
                    self.config
                        .retry
                        .run("graph store", || self.store.load_communities(&key))
                        .await
                })
                .await?;
            all.extend(loaded.iter().cloned());
        }
        Ok(all)
    }

    /// Top communities with positive overlap; ties keep load order.
    fn select_communities<'a>(&self, query: &str, communities: &'a [Community]) -> Vec<&'a Community> {
        let mut scored: Vec<(&Community, f64)> = communities
            .iter()
            .map(|c| (c, community_overlap(query, c)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.config.graph.communities_per_domain)
            .map(|(c, _)| c)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::graph::builder::GraphBuilder;
    use crate::toolkit::testing::{Fixture, ScriptedExtractor, corpus};

    fn classifier(fixture: &Fixture) -> Arc<QueryClassifier> {
        Arc::new(QueryClassifier::from_config(&fixture.config).unwrap())
    }

    fn retriever(fixture: &Fixture, cache: Arc<CommunityCache>) -> GraphRetriever {
        GraphRetriever::new(
            Arc::new(fixture.hybrid(None)),
            fixture.graphs.clone(),
            classifier(fixture),
            cache,
            Arc::clone(&fixture.config),
        )
    }

    fn community(id: &str, entity_type: &str, summary: &str) -> Community {
        Community {
            id: id.to_string(),
            entity_type: entity_type.to_string(),
            entity_names: Vec::new(),
            summary: summary.to_string(),
            category: Some("star".to_string()),
        }
    }

    #[test]
    fn test_community_overlap() {
        let c = community("a", "星曜", "星曜相关实体: 紫微, 天府");
        assert!((community_overlap("紫微", &c) - 1.0).abs() < 1e-9);
        assert!((community_overlap("紫气", &c) - 0.5).abs() < 1e-9);
        assert_eq!(community_overlap("", &c), 0.0);
    }

    #[test]
    fn test_selects_top_three_keeping_load_order_on_ties() {
        let fixture = Fixture::empty();
        let graph = retriever(&fixture, Arc::new(CommunityCache::new()));
        let communities = vec![
            community("a", "星曜", "星曜相关实体: 紫微"),
            community("b", "宫位", "宫位相关实体: 紫微"),
            community("x", "十神", "十神相关实体: 正官"),
            community("c", "四化", "四化相关实体: 紫微"),
            community("d", "格局", "格局相关实体: 紫微"),
        ];

        let selected: Vec<&str> = graph
            .select_communities("紫微", &communities)
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(selected, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_local_without_entities_equals_hybrid() {
        let fixture = Fixture::new().await;
        let graph = retriever(&fixture, Arc::new(CommunityCache::new()));
        let domains = ["ziwei".to_string()];

        let query = "帝星尊贵如何";
        let expected = fixture.hybrid(None).search(query, &domains, None, 5).await;
        let actual = graph.local_search(query, None, &domains, None, 5).await;
        assert_eq!(expected, actual);
    }

    #[tokio::test]
    async fn test_local_search_by_entities() {
        let fixture = Fixture::new().await;
        let graph = retriever(&fixture, Arc::new(CommunityCache::new()));
        let domains = ["ziwei".to_string()];

        let results = graph.local_search("紫微和七杀的关系", None, &domains, None, 3).await;
        assert!(!results.is_empty());
        assert!(results.len() <= 3);
        assert!(results.iter().all(|r| r.provenance == Provenance::Graph));

        let keys: HashSet<ResultKey> = results.iter().map(|r| r.key()).collect();
        assert_eq!(keys.len(), results.len());
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_global_without_communities_is_empty() {
        let fixture = Fixture::new().await;
        let graph = retriever(&fixture, Arc::new(CommunityCache::new()));
        let results = graph.global_search("紫微星的格局", &["ziwei".to_string()], 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_global_searches_matching_community_collections() {
        let fixture = Fixture::new().await;
        let cache = Arc::new(CommunityCache::new());
        let builder = GraphBuilder::new(
            Arc::new(ScriptedExtractor::new().reply("紫微星", &[("紫府同宫格", "格局")], &[])),
            fixture.graphs.clone(),
            Arc::clone(&cache),
            &fixture.config,
        );
        let star: Vec<_> = corpus().into_iter().filter(|e| e.category == "star").collect();
        let report = builder.build(&CollectionKey::new("ziwei", "star"), &star).await.unwrap();
        assert!(report.communities > 0);

        let graph = retriever(&fixture, Arc::clone(&cache));
        let results = graph.global_search("紫微星", &["ziwei".to_string()], 5).await;
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.category == "star" && r.provenance == Provenance::Graph));

        // community loads are cached per collection
        let builds = cache.builds();
        graph.global_search("天府", &["ziwei".to_string()], 5).await;
        assert_eq!(cache.builds(), builds);
    }

    #[test]
    fn test_union_keeps_max() {
        let fixture_result = |id: &str, score: f64| SearchResult {
            id: id.to_string(),
            content: String::new(),
            score,
            title: String::new(),
            domain: "ziwei".to_string(),
            category: "star".to_string(),
            level: Default::default(),
            provenance: Provenance::Vector,
            distance: None,
        };
        let merged = union_keep_max(vec![
            fixture_result("a", 0.2),
            fixture_result("b", 0.5),
            fixture_result("a", 0.9),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "a");
        assert!((merged[0].score - 0.9).abs() < 1e-9);
    }
}
