

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::StoreError;
use crate::core::cache::LazyIndexCache;
use crate::core::error::RagError;
use crate::core::models::{CollectionKey, KnowledgeEntry, KnowledgeLevel};
use crate::utils::tokenize;


#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub id: String,
    pub title: String,
    pub content: String,
    pub level: KnowledgeLevel,
    /// Non-negative; zero-score documents are never returned.
    pub score: f64,
}


#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Replace the collection's documents.
    async fn build(&self, collection: &CollectionKey, entries: &[KnowledgeEntry]) -> Result<usize, StoreError>;

    async fn query(&self, collection: &CollectionKey, text: &str, k: usize) -> Result<Vec<KeywordHit>, StoreError>;
}

#[async_trait]
impl KeywordIndex for Arc<dyn KeywordIndex> {
    async fn build(&self, collection: &CollectionKey, entries: &[KnowledgeEntry]) -> Result<usize, StoreError> {
        (**self).build(collection, entries).await
    }

    async fn query(&self, collection: &CollectionKey, text: &str, k: usize) -> Result<Vec<KeywordHit>, StoreError> {
        (**self).query(collection, text, k).await
    }
}


#[derive(Debug, Clone)]
struct IndexedDocument {
    id: String,
    title: String,
    content: String,
    level: KnowledgeLevel,
    term_freqs: HashMap<String, usize>,
    length: usize,
}

impl IndexedDocument {
    fn from_entry(entry: &KnowledgeEntry) -> Self {
        let mut text = format!("{} {}", entry.title, entry.content);
        for keyword in &entry.keywords {
            text.push(' ');
            text.push_str(keyword);
        }

        let tokens = tokenize(&text);
        let mut term_freqs = HashMap::new();
        for token in &tokens {
            *term_freqs.entry(token.clone()).or_insert(0) += 1;
        }

        Self {
            id: entry.id.clone(),
            title: entry.title.clone(),
            content: entry.content.clone(),
            level: entry.level,
            term_freqs,
            length: tokens.len(),
        }
    }
}


/// Corpus statistics, derived lazily from a collection's documents.
#[derive(Debug)]
struct Bm25Stats {
    idf: HashMap<String, f64>,
    avg_length: f64,
}

impl Bm25Stats {
    fn compute(documents: &[IndexedDocument]) -> Self {
        let n = documents.len() as f64;
        let mut doc_freqs: HashMap<&str, usize> = HashMap::new();
        for doc in documents {
            for term in doc.term_freqs.keys() {
                *doc_freqs.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let idf = doc_freqs
            .into_iter()
            .map(|(term, df)| {
                let df = df as f64;
                (term.to_string(), ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect();

        let total: usize = documents.iter().map(|d| d.length).sum();
        let avg_length = if documents.is_empty() { 0.0 } else { total as f64 / n };

        Self { idf, avg_length }
    }
}


/// Documents together with the statistics computed from exactly them.
struct Bm25Snapshot {
    documents: Arc<Vec<IndexedDocument>>,
    stats: Bm25Stats,
}


pub struct Bm25Index {
    k1: f64,
    b: f64,
    documents: RwLock<HashMap<CollectionKey, Arc<Vec<IndexedDocument>>>>,
    snapshots: LazyIndexCache<CollectionKey, Bm25Snapshot>,
}

impl Bm25Index {
    pub fn new(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            documents: RwLock::new(HashMap::new()),
            snapshots: LazyIndexCache::new(),
        }
    }

    /// Number of statistics builds performed so far.
    pub fn stats_builds(&self) -> u64 {
        self.snapshots.builds()
    }

    fn score(&self, doc: &IndexedDocument, terms: &[String], stats: &Bm25Stats) -> f64 {
        let norm = if stats.avg_length > 0.0 {
            1.0 - self.b + self.b * doc.length as f64 / stats.avg_length
        } else {
            1.0
        };

        terms
            .iter()
            .filter_map(|term| {
                let tf = *doc.term_freqs.get(term)? as f64;
                let idf = stats.idf.get(term).copied().unwrap_or(0.0);
                Some(idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm))
            })
            .sum()
    }
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new(1.5, 0.75)
    }
}

#[async_trait]
impl KeywordIndex for Bm25Index {
    async fn build(&self, collection: &CollectionKey, entries: &[KnowledgeEntry]) -> Result<usize, StoreError> {
        let documents: Vec<IndexedDocument> = entries
            .iter()
            .filter(|e| !e.content.trim().is_empty())
            .map(IndexedDocument::from_entry)
            .collect();
        let count = documents.len();

        self.documents.write().insert(collection.clone(), Arc::new(documents));
        self.snapshots.invalidate(collection);

        info!("BM25 index for {} built with {} documents", collection, count);
        Ok(count)
    }

    async fn query(&self, collection: &CollectionKey, text: &str, k: usize) -> Result<Vec<KeywordHit>, StoreError> {
        let snapshot = self
            .snapshots
            .get_or_try_build(collection, || async {
                let documents = self
                    .documents
                    .read()
                    .get(collection)
                    .cloned()
                    .ok_or_else(|| RagError::CollectionNotFound(collection.clone()))?;
                let stats = Bm25Stats::compute(&documents);
                Ok(Bm25Snapshot { documents, stats })
            })
            .await
            .map_err(|e| match e {
                RagError::CollectionNotFound(key) => StoreError::CollectionNotFound(key),
                other => StoreError::Backend(other.to_string()),
            })?;
        let (documents, stats) = (&snapshot.documents, &snapshot.stats);

        let mut terms = tokenize(text);
        let mut seen = std::collections::HashSet::new();
        terms.retain(|t| seen.insert(t.clone()));

        let mut hits: Vec<KeywordHit> = documents
            .iter()
            .filter_map(|doc| {
                let score = self.score(doc, &terms, stats);
                (score > 0.0).then(|| KeywordHit {
                    id: doc.id.clone(),
                    title: doc.title.clone(),
                    content: doc.content.clone(),
                    level: doc.level,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);

        debug!("BM25 query on {} returned {} hits", collection, hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, title: &str, content: &str) -> KnowledgeEntry {
        KnowledgeEntry::new(id, title, content, &CollectionKey::new("shared", "basic"))
    }

    fn corpus() -> Vec<KnowledgeEntry> {
        vec![
            entry("1", "五行", "五行指金木水火土, 相生相克"),
            entry("2", "天干", "十天干: 甲乙丙丁戊己庚辛壬癸"),
            entry("3", "地支", "十二地支: 子丑寅卯辰巳午未申酉戌亥"),
        ]
    }

    #[tokio::test]
    async fn test_query_ranks_matching_document_first() {
        let index = Bm25Index::default();
        let key = CollectionKey::new("shared", "basic");
        index.build(&key, &corpus()).await.unwrap();

        let hits = index.query(&key, "五行相生", 10).await.unwrap();
        assert_eq!(hits[0].id, "1");
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[tokio::test]
    async fn test_zero_scores_excluded() {
        let index = Bm25Index::default();
        let key = CollectionKey::new("shared", "basic");
        index.build(&key, &corpus()).await.unwrap();

        assert!(index.query(&key, "xyz", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unbuilt_collection_not_found() {
        let index = Bm25Index::default();
        let err = index
            .query(&CollectionKey::new("ziwei", "star"), "紫微", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_stats_built_lazily_once_per_build() {
        let index = Bm25Index::default();
        let key = CollectionKey::new("shared", "basic");
        index.build(&key, &corpus()).await.unwrap();
        assert_eq!(index.stats_builds(), 0);

        index.query(&key, "五行", 5).await.unwrap();
        index.query(&key, "天干", 5).await.unwrap();
        assert_eq!(index.stats_builds(), 1);

        index.build(&key, &corpus()[..1]).await.unwrap();
        index.query(&key, "五行", 5).await.unwrap();
        assert_eq!(index.stats_builds(), 2);
    }

    #[tokio::test]
    async fn test_rebuilt_collection_scores_match_fresh_index() {
        let key = CollectionKey::new("shared", "basic");
        let rebuilt = Bm25Index::default();
        rebuilt.build(&key, &corpus()).await.unwrap();
        rebuilt.query(&key, "五行", 5).await.unwrap();

        let replacement = vec![corpus()[0].clone(), entry("4", "五行生克", "木生火, 火生土")];
        rebuilt.build(&key, &replacement).await.unwrap();

        let fresh = Bm25Index::default();
        fresh.build(&key, &replacement).await.unwrap();

        let from_rebuilt = rebuilt.query(&key, "五行", 5).await.unwrap();
        let from_fresh = fresh.query(&key, "五行", 5).await.unwrap();
        assert_eq!(from_rebuilt, from_fresh);
        assert!(rebuilt.query(&key, "天干", 5).await.unwrap().is_empty());
    }
}
