
//! In-memory collaborators and a small indexed corpus for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::core::config::RagConfig;
use crate::core::models::{CollectionKey, KnowledgeEntry, KnowledgeLevel, Relation};
use crate::core::resilience::RetryPolicy;
use crate::db::{
    Bm25Index, DeleteSelector, KeywordIndex, MemoryGraphStore, MemoryVectorStore, MetadataFilter, StoreError, VectorHit,
    VectorRecord, VectorStore,
};
use crate::llm::{
    ChatTurn, EmbeddingError, EmbeddingProvider, EntityExtractionProvider, ExtractedEntity, ExtractionOutput,
    GenerativeProvider, LlmProviderError, RerankProvider,
};
use crate::toolkit::registry::Collaborators;
use crate::toolkit::search::HybridRetriever;
use crate::utils::tokenize;

const DIMS: usize = 64;


/// Bag-of-tokens vectors hashed into fixed buckets. Deterministic.
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for token in tokenize(text) {
            let bucket = token.chars().map(|c| c as usize).sum::<usize>() % DIMS;
            v[bucket] += 1.0;
        }
        v
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "hash"
    }
}


pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::RateLimited)
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}


/// Reads and deletes go to the wrapped store; every upsert is refused.
pub struct FullVectorStore {
    pub inner: Arc<MemoryVectorStore>,
}

#[async_trait]
impl VectorStore for FullVectorStore {
    async fn upsert(&self, _collection: &CollectionKey, _records: Vec<VectorRecord>) -> Result<usize, StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn query(
        &self,
        collection: &CollectionKey,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, StoreError> {
        self.inner.query(collection, embedding, k, filter).await
    }

    async fn delete(&self, collection: &CollectionKey, selector: DeleteSelector) -> Result<usize, StoreError> {
        self.inner.delete(collection, selector).await
    }

    async fn count(&self, collection: &CollectionKey) -> Result<usize, StoreError> {
        self.inner.count(collection).await
    }

    async fn ids(&self, collection: &CollectionKey) -> Result<Vec<String>, StoreError> {
        self.inner.ids(collection).await
    }
}


pub struct FlakyReranker;

#[async_trait]
impl RerankProvider for FlakyReranker {
    async fn score(&self, _query: &str, _documents: &[String]) -> Result<Vec<f64>, LlmProviderError> {
        Err(LlmProviderError::Provider("reranker offline".to_string()))
    }
}


/// Replies keyed by document title; unknown titles extract nothing.
#[derive(Default)]
pub struct ScriptedExtractor {
    replies: HashMap<String, ExtractionOutput>,
    failing: Vec<String>,
    pub calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, title: &str, entities: &[(&str, &str)], relations: &[(&str, &str, &str)]) -> Self {
        let output = ExtractionOutput {
            entities: entities
                .iter()
                .map(|(name, ty)| ExtractedEntity {
                    name: name.to_string(),
                    entity_type: ty.to_string(),
                    description: None,
                })
                .collect(),
            relations: relations
                .iter()
                .map(|(source, target, ty)| Relation {
                    source: source.to_string(),
                    target: target.to_string(),
                    relation_type: ty.to_string(),
                    description: None,
                })
                .collect(),
        };
        self.replies.insert(title.to_string(), output);
        self
    }

    pub fn fail_on(mut self, title: &str) -> Self {
        self.failing.push(title.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityExtractionProvider for ScriptedExtractor {
    async fn extract(&self, _content: &str, title: &str) -> Result<ExtractionOutput, LlmProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|t| t == title) {
            return Err(LlmProviderError::Provider(format!("extraction failed for {}", title)));
        }
        Ok(self.replies.get(title).cloned().unwrap_or_default())
    }
}


pub struct EchoGenerator;

#[async_trait]
impl GenerativeProvider for EchoGenerator {
    async fn complete(
        &self,
        system_prompts: &[String],
        history: &[ChatTurn],
        user_query: &str,
    ) -> Result<String, LlmProviderError> {
        Ok(format!(
            "prompts={} history={} query={}",
            system_prompts.len(),
            history.len(),
            user_query
        ))
    }
}


pub struct FailingGenerator;

#[async_trait]
impl GenerativeProvider for FailingGenerator {
    async fn complete(&self, _: &[String], _: &[ChatTurn], _: &str) -> Result<String, LlmProviderError> {
        Err(LlmProviderError::Provider("generator offline".to_string()))
    }
}


pub fn test_config() -> RagConfig {
    RagConfig {
        retry: RetryPolicy::new(2, 1, 5),
        ..Default::default()
    }
}

pub fn entry(domain: &str, category: &str, id: &str, title: &str, content: &str) -> KnowledgeEntry {
    let mut entry = KnowledgeEntry::new(id, title, content, &CollectionKey::new(domain, category));
    entry.level = KnowledgeLevel::Basic;
    entry
}

pub fn corpus() -> Vec<KnowledgeEntry> {
    vec![
        entry("ziwei", "star", "z1", "紫微星", "紫微星为帝星, 主尊贵, 与天府同宫称紫府同宫格"),
        entry("ziwei", "star", "z2", "天府星", "天府星为财库之星, 稳重保守"),
        entry("ziwei", "star", "z3", "七杀星", "七杀星主肃杀, 与破军贪狼成杀破狼格"),
        entry("ziwei", "palace", "p1", "命宫", "命宫是十二宫之首, 紫微在命宫主贵"),
        entry("shared", "basic", "s1", "五行", "五行指金木水火土, 相生相克"),
        entry("shared", "basic", "s2", "天干地支", "十天干与十二地支合称干支"),
        entry("bazi", "yongshen", "b1", "用神", "用神是八字中最需要的五行"),
        entry("qimen", "nine_star", "q1", "九星", "天蓬天任天冲天辅天英天芮天柱天心为九星"),
    ]
}


pub struct Fixture {
    pub config: Arc<RagConfig>,
    pub vectors: Arc<MemoryVectorStore>,
    pub keywords: Arc<Bm25Index>,
    pub embedder: Arc<HashEmbedder>,
    pub graphs: Arc<MemoryGraphStore>,
}

impl Fixture {
    pub async fn new() -> Self {
        let fixture = Self::empty();
        fixture.load(&corpus()).await;
        fixture
    }

    pub fn empty() -> Self {
        Self {
            config: Arc::new(test_config()),
            vectors: Arc::new(MemoryVectorStore::new()),
            keywords: Arc::new(Bm25Index::default()),
            embedder: Arc::new(HashEmbedder::default()),
            graphs: Arc::new(MemoryGraphStore::new()),
        }
    }

    /// Index entries directly into the stores, one collection at a time.
    pub async fn load(&self, entries: &[KnowledgeEntry]) {
        let mut order: Vec<CollectionKey> = Vec::new();
        for e in entries {
            if !order.contains(&e.collection()) {
                order.push(e.collection());
            }
        }

        for key in order {
            let members: Vec<KnowledgeEntry> = entries.iter().filter(|e| e.collection() == key).cloned().collect();
            let records = members
                .iter()
                .map(|e| VectorRecord::from_entry(e, HashEmbedder::vector(&e.content)))
                .collect();
            self.vectors.upsert(&key, records).await.unwrap();
            self.keywords.build(&key, &members).await.unwrap();
        }
    }

    pub fn hybrid(&self, reranker: Option<Arc<dyn RerankProvider>>) -> HybridRetriever {
        HybridRetriever::new(
            self.vectors.clone(),
            self.keywords.clone(),
            self.embedder.clone(),
            reranker,
            Arc::clone(&self.config),
        )
    }

    pub fn collaborators(&self, extractor: Arc<dyn EntityExtractionProvider>) -> Collaborators {
        Collaborators {
            vector_store: self.vectors.clone(),
            keyword_index: self.keywords.clone(),
            embedder: self.embedder.clone(),
            extractor,
            graph_store: self.graphs.clone(),
            reranker: None,
            generator: Some(Arc::new(EchoGenerator)),
        }
    }
}
