

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::models::{Community, Entity, KnowledgeGraph};
use crate::core::cache::LazyIndexCache;
use crate::core::config::{GraphConfig, RagConfig};
use crate::core::error::{RagError, Result};
use crate::core::models::{CollectionKey, KnowledgeEntry, Relation};
use crate::core::resilience::RetryPolicy;
use crate::db::GraphStore;
use crate::llm::{EntityExtractionProvider, ExtractionOutput};
use crate::toolkit::router::SemanticVocabulary;


pub type CommunityCache = LazyIndexCache<CollectionKey, Vec<Community>>;


#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphBuildReport {
    pub entities: usize,
    pub relations: usize,
    pub documents: usize,
    pub communities: usize,
    pub failed_documents: usize,
}


/// Per-document extraction result, before batch-wide deduplication.
struct DocumentExtraction<'a> {
    entry: &'a KnowledgeEntry,
    output: Option<ExtractionOutput>,
}


pub struct GraphBuilder {
    extractor: Arc<dyn EntityExtractionProvider>,
    store: Arc<dyn GraphStore>,
    communities: Arc<CommunityCache>,
    vocabulary: SemanticVocabulary,
    settings: GraphConfig,
    retry: RetryPolicy,
}

impl GraphBuilder {
    pub fn new(
        extractor: Arc<dyn EntityExtractionProvider>,
        store: Arc<dyn GraphStore>,
        communities: Arc<CommunityCache>,
        config: &RagConfig,
    ) -> Self {
        Self {
            extractor,
            store,
            communities,
            vocabulary: SemanticVocabulary::default(),
            settings: config.graph.clone(),
            retry: config.retry.clone(),
        }
    }

    pub async fn build(&self, collection: &CollectionKey, entries: &[KnowledgeEntry]) -> Result<GraphBuildReport> {
        let documents: Vec<&KnowledgeEntry> = entries.iter().filter(|e| !e.content.trim().is_empty()).collect();
        info!("Building graph for {} from {} documents", collection, documents.len());

        let extractions = self.extract_all(&documents).await;
        let failed_documents = extractions.iter().filter(|x| x.output.is_none()).count();

        let mut graph = KnowledgeGraph::new(collection);
        graph.document_count = documents.len();
        self.merge(&mut graph, &extractions);

        self.retry
            .run("graph store", || self.store.save_graph(&graph))
            .await?;

        let communities = if graph.entities.len() >= self.settings.community_min_entities {
            let communities = self.communities_for(&graph);
            self.retry
                .run("graph store", || self.store.save_communities(collection, &communities))
                .await?;
            communities
        } else {
            let removed = self
                .retry
                .run("graph store", || self.store.delete_communities(collection))
                .await?;
            if removed {
                debug!("Removed stale communities for {}", collection);
            }
            Vec::new()
        };

        self.communities.invalidate(collection);

        let report = GraphBuildReport {
            entities: graph.entities.len(),
            relations: graph.relations.len(),
            documents: documents.len(),
            communities: communities.len(),
            failed_documents,
        };
        info!(
            "Graph for {} built: {} entities, {} relations, {} communities ({} documents failed)",
            collection, report.entities, report.relations, report.communities, report.failed_documents
        );
        Ok(report)
    }

    /// Bounded concurrency, results in document order.
    async fn extract_all<'a>(&self, documents: &[&'a KnowledgeEntry]) -> Vec<DocumentExtraction<'a>> {
        let concurrency = self.settings.extraction_concurrency.max(1);
        let futures: Vec<_> = documents.iter().map(|&entry| self.extract_doc(entry)).collect();

        stream::iter(futures).buffered(concurrency).collect().await
    }

    async fn extract_doc<'a>(&self, entry: &'a KnowledgeEntry) -> DocumentExtraction<'a> {
        let output = match self.extract_one(entry).await {
            Ok(output) => Some(output),
            Err(RagError::MalformedExtraction(reason)) => {
                warn!("Malformed extraction for {}: {}", entry.id, reason);
                Some(ExtractionOutput::default())
            }
            Err(e) => {
                warn!("Extraction failed for {}, skipping: {}", entry.id, e);
                None
            }
        };
        DocumentExtraction { entry, output }
    }

    async fn extract_one(&self, entry: &KnowledgeEntry) -> Result<ExtractionOutput> {
        let prefix = crate::safe_truncate(&entry.content, self.settings.content_prefix_chars);
        self.retry
            .run("entity extraction", || self.extractor.extract(&prefix, &entry.title))
            .await
    }

    /// Dictionary hits first, then extracted entities; first name wins across
    /// the whole batch while every document id is still recorded.
    fn merge(&self, graph: &mut KnowledgeGraph, extractions: &[DocumentExtraction<'_>]) {
        let mut index: HashMap<String, usize> = HashMap::new();

        for extraction in extractions {
            let entry = extraction.entry;

            let dictionary_hits = self
                .vocabulary
                .scan(&entry.content)
                .into_iter()
                .map(|(name, ty)| (name, ty, None));

            let extracted = extraction
                .output
                .iter()
                .flat_map(|o| o.entities.iter())
                .map(|e| {
                    let ty = if e.entity_type.trim().is_empty() {
                        "概念".to_string()
                    } else {
                        e.entity_type.clone()
                    };
                    (e.name.trim().to_string(), ty, e.description.clone())
                });

            for (name, entity_type, description) in dictionary_hits.chain(extracted) {
                if name.chars().count() < self.settings.min_entity_chars {
                    continue;
                }
                match index.get(&name) {
                    Some(&i) => {
                        graph.entities[i].documents.insert(entry.id.clone());
                    }
                    None => {
                        index.insert(name.clone(), graph.entities.len());
                        graph.entities.push(Entity {
                            name,
                            entity_type,
                            source_doc_id: entry.id.clone(),
                            description,
                            documents: BTreeSet::from([entry.id.clone()]),
                        });
                    }
                }
            }

            if let Some(output) = &extraction.output {
                graph.relations.extend(
                    output
                        .relations
                        .iter()
                        .filter(|r| !r.source.trim().is_empty() && !r.target.trim().is_empty())
                        .cloned()
                        .map(|r| Relation {
                            source: r.source.trim().to_string(),
                            target: r.target.trim().to_string(),
                            ..r
                        }),
                );
            }
        }
    }

    /// One community per entity type, in first-seen type order.
    fn communities_for(&self, graph: &KnowledgeGraph) -> Vec<Community> {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for entity in &graph.entities {
            match groups.iter_mut().find(|(ty, _)| *ty == entity.entity_type) {
                Some((_, names)) => names.push(entity.name.clone()),
                None => groups.push((entity.entity_type.clone(), vec![entity.name.clone()])),
            }
        }

        groups
            .into_iter()
            .map(|(entity_type, entity_names)| {
                let preview: Vec<&str> = entity_names
                    .iter()
                    .take(self.settings.summary_preview)
                    .map(String::as_str)
                    .collect();
                Community {
                    id: format!("{}_{}_{}", graph.domain, graph.category, entity_type),
                    summary: format!("{}相关实体: {}", entity_type, preview.join(", ")),
                    entity_type,
                    entity_names,
                    category: Some(graph.category.clone()),
                }
            })
            .collect()
    }
}
