

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::StoreError;
use crate::core::models::{CollectionKey, KnowledgeEntry, KnowledgeLevel};


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub level: KnowledgeLevel,
    #[serde(default)]
    pub keywords: Vec<String>,
}


#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

impl VectorRecord {
    pub fn from_entry(entry: &KnowledgeEntry, embedding: Vec<f32>) -> Self {
        Self {
            id: entry.id.clone(),
            content: entry.content.clone(),
            embedding,
            metadata: DocumentMetadata {
                title: entry.title.clone(),
                level: entry.level,
                keywords: entry.keywords.clone(),
            },
        }
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Cosine distance in `[0, 1]`; smaller is closer.
    pub distance: f64,
}


#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub level: Option<KnowledgeLevel>,
}

impl MetadataFilter {
    fn matches(&self, metadata: &DocumentMetadata) -> bool {
        self.level.is_none_or(|level| metadata.level == level)
    }
}


#[derive(Debug, Clone)]
pub enum DeleteSelector {
    Ids(Vec<String>),
    Filter(MetadataFilter),
}


#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, collection: &CollectionKey, records: Vec<VectorRecord>) -> Result<usize, StoreError>;

    async fn query(
        &self,
        collection: &CollectionKey,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, StoreError>;

    async fn delete(&self, collection: &CollectionKey, selector: DeleteSelector) -> Result<usize, StoreError>;

    async fn count(&self, collection: &CollectionKey) -> Result<usize, StoreError>;

    /// Ids currently stored; empty for an unknown collection.
    async fn ids(&self, collection: &CollectionKey) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl VectorStore for Arc<dyn VectorStore> {
    async fn upsert(&self, collection: &CollectionKey, records: Vec<VectorRecord>) -> Result<usize, StoreError> {
        (**self).upsert(collection, records).await
    }

    async fn query(
        &self,
        collection: &CollectionKey,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, StoreError> {
        (**self).query(collection, embedding, k, filter).await
    }

    async fn delete(&self, collection: &CollectionKey, selector: DeleteSelector) -> Result<usize, StoreError> {
        (**self).delete(collection, selector).await
    }

    async fn count(&self, collection: &CollectionKey) -> Result<usize, StoreError> {
        (**self).count(collection).await
    }

    async fn ids(&self, collection: &CollectionKey) -> Result<Vec<String>, StoreError> {
        (**self).ids(collection).await
    }
}


/// Cosine similarity rescaled from `[-1, 1]` to `[0, 1]`.
pub fn cosine_similarity(vec1: &[f32], vec2: &[f32]) -> f64 {
    if vec1.is_empty() || vec2.is_empty() || vec1.len() != vec2.len() {
        return 0.0;
    }

    let dot: f32 = vec1.iter().zip(vec2).map(|(a, b)| a * b).sum();
    let mag1: f32 = vec1.iter().map(|a| a * a).sum::<f32>().sqrt();
    let mag2: f32 = vec2.iter().map(|b| b * b).sum::<f32>().sqrt();

    if mag1 == 0.0 || mag2 == 0.0 {
        return 0.0;
    }

    let similarity = f64::from(dot / (mag1 * mag2));
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}


/// Brute-force in-process store. Records keep insertion order so equal
/// distances come back deterministically.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<CollectionKey, Vec<VectorRecord>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, collection: &CollectionKey, records: Vec<VectorRecord>) -> Result<usize, StoreError> {
        let mut collections = self.collections.write();
        let stored = collections.entry(collection.clone()).or_default();

        let expected = stored
            .first()
            .or(records.first())
            .map(|r| r.embedding.len());
        if let Some(expected) = expected {
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: bad.embedding.len(),
                });
            }
        }

        let count = records.len();
        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }

        debug!("Upserted {} vectors into {}", count, collection);
        Ok(count)
    }

    async fn query(
        &self,
        collection: &CollectionKey,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, StoreError> {
        let collections = self.collections.read();
        let records = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.clone()))?;

        let mut hits: Vec<VectorHit> = records
            .iter()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.metadata)))
            .map(|r| VectorHit {
                id: r.id.clone(),
                content: r.content.clone(),
                metadata: r.metadata.clone(),
                distance: 1.0 - cosine_similarity(embedding, &r.embedding),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, collection: &CollectionKey, selector: DeleteSelector) -> Result<usize, StoreError> {
        let mut collections = self.collections.write();
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = records.len();
        match selector {
            DeleteSelector::Ids(ids) => records.retain(|r| !ids.contains(&r.id)),
            DeleteSelector::Filter(filter) => records.retain(|r| !filter.matches(&r.metadata)),
        }
        Ok(before - records.len())
    }

    async fn count(&self, collection: &CollectionKey) -> Result<usize, StoreError> {
        Ok(self.collections.read().get(collection).map_or(0, Vec::len))
    }

    async fn ids(&self, collection: &CollectionKey) -> Result<Vec<String>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|records| records.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, embedding: Vec<f32>, level: KnowledgeLevel) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            content: format!("content {}", id),
            embedding,
            metadata: DocumentMetadata {
                title: id.to_string(),
                level,
                keywords: Vec::new(),
            },
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.01);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 0.01);
        assert!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).abs() < 0.01);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let store = MemoryVectorStore::new();
        let key = CollectionKey::new("ziwei", "star");
        store
            .upsert(
                &key,
                vec![
                    record("far", vec![0.0, 1.0], KnowledgeLevel::Basic),
                    record("near", vec![1.0, 0.1], KnowledgeLevel::Advanced),
                ],
            )
            .await
            .unwrap();

        let hits = store.query(&key, &[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].distance < hits[1].distance);

        let filter = MetadataFilter {
            level: Some(KnowledgeLevel::Basic),
        };
        let hits = store.query(&key, &[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "far");
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete() {
        let store = MemoryVectorStore::new();
        let key = CollectionKey::new("bazi", "dayun");
        store.upsert(&key, vec![record("a", vec![1.0], KnowledgeLevel::Basic)]).await.unwrap();
        store.upsert(&key, vec![record("a", vec![0.5], KnowledgeLevel::Basic)]).await.unwrap();
        assert_eq!(store.count(&key).await.unwrap(), 1);

        let removed = store.delete(&key, DeleteSelector::Ids(vec!["a".into()])).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let store = MemoryVectorStore::new();
        let err = store
            .query(&CollectionKey::new("qimen", "formation"), &[1.0], 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = MemoryVectorStore::new();
        let key = CollectionKey::new("ziwei", "palace");
        store.upsert(&key, vec![record("a", vec![1.0, 0.0], KnowledgeLevel::Basic)]).await.unwrap();
        let err = store
            .upsert(&key, vec![record("b", vec![1.0], KnowledgeLevel::Basic)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[tokio::test]
    async fn test_rejected_batch_leaves_collection_untouched() {
        let store = MemoryVectorStore::new();
        let key = CollectionKey::new("ziwei", "palace");
        store.upsert(&key, vec![record("a", vec![1.0, 0.0], KnowledgeLevel::Basic)]).await.unwrap();

        let batch = vec![
            record("a", vec![0.0, 1.0], KnowledgeLevel::Advanced),
            record("b", vec![1.0], KnowledgeLevel::Basic),
        ];
        assert!(store.upsert(&key, batch).await.is_err());

        assert_eq!(store.ids(&key).await.unwrap(), vec!["a".to_string()]);
        let hits = store.query(&key, &[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits[0].metadata.level, KnowledgeLevel::Basic);
    }
}
