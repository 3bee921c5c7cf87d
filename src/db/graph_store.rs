

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::StoreError;
use crate::core::models::CollectionKey;
use crate::toolkit::graph::models::{Community, KnowledgeGraph};


/// Persistence for per-collection graphs and their communities. Saves
/// overwrite; a collection with no stored communities loads as empty.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn save_graph(&self, graph: &KnowledgeGraph) -> Result<(), StoreError>;

    async fn load_graph(&self, collection: &CollectionKey) -> Result<Option<KnowledgeGraph>, StoreError>;

    async fn save_communities(&self, collection: &CollectionKey, communities: &[Community]) -> Result<(), StoreError>;

    async fn load_communities(&self, collection: &CollectionKey) -> Result<Vec<Community>, StoreError>;

    /// Returns whether anything was removed.
    async fn delete_communities(&self, collection: &CollectionKey) -> Result<bool, StoreError>;
}

#[async_trait]
impl GraphStore for Arc<dyn GraphStore> {
    async fn save_graph(&self, graph: &KnowledgeGraph) -> Result<(), StoreError> {
        (**self).save_graph(graph).await
    }

    async fn load_graph(&self, collection: &CollectionKey) -> Result<Option<KnowledgeGraph>, StoreError> {
        (**self).load_graph(collection).await
    }

    async fn save_communities(&self, collection: &CollectionKey, communities: &[Community]) -> Result<(), StoreError> {
        (**self).save_communities(collection, communities).await
    }

    async fn load_communities(&self, collection: &CollectionKey) -> Result<Vec<Community>, StoreError> {
        (**self).load_communities(collection).await
    }

    async fn delete_communities(&self, collection: &CollectionKey) -> Result<bool, StoreError> {
        (**self).delete_communities(collection).await
    }
}


#[derive(Default)]
pub struct MemoryGraphStore {
    graphs: RwLock<HashMap<CollectionKey, KnowledgeGraph>>,
    communities: RwLock<HashMap<CollectionKey, Vec<Community>>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn save_graph(&self, graph: &KnowledgeGraph) -> Result<(), StoreError> {
        self.graphs.write().insert(graph.collection(), graph.clone());
        Ok(())
    }

    async fn load_graph(&self, collection: &CollectionKey) -> Result<Option<KnowledgeGraph>, StoreError> {
        Ok(self.graphs.read().get(collection).cloned())
    }

    async fn save_communities(&self, collection: &CollectionKey, communities: &[Community]) -> Result<(), StoreError> {
        self.communities.write().insert(collection.clone(), communities.to_vec());
        Ok(())
    }

    async fn load_communities(&self, collection: &CollectionKey) -> Result<Vec<Community>, StoreError> {
        Ok(self.communities.read().get(collection).cloned().unwrap_or_default())
    }

    async fn delete_communities(&self, collection: &CollectionKey) -> Result<bool, StoreError> {
        Ok(self.communities.write().remove(collection).is_some())
    }
}


/// One `{domain}_{category}_graph.json` and one
/// `{domain}_{category}_communities.json` per collection.
pub struct JsonGraphStore {
    dir: PathBuf,
}

impl JsonGraphStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        info!("Graph store at {}", dir.display());
        Ok(Self { dir })
    }

    fn graph_path(&self, collection: &CollectionKey) -> PathBuf {
        self.dir
            .join(format!("{}_{}_graph.json", collection.domain, collection.category))
    }

    fn communities_path(&self, collection: &CollectionKey) -> PathBuf {
        self.dir
            .join(format!("{}_{}_communities.json", collection.domain, collection.category))
    }

    async fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl GraphStore for JsonGraphStore {
    async fn save_graph(&self, graph: &KnowledgeGraph) -> Result<(), StoreError> {
        Self::write_json(&self.graph_path(&graph.collection()), graph).await
    }

    async fn load_graph(&self, collection: &CollectionKey) -> Result<Option<KnowledgeGraph>, StoreError> {
        Self::read_json(&self.graph_path(collection)).await
    }

    async fn save_communities(&self, collection: &CollectionKey, communities: &[Community]) -> Result<(), StoreError> {
        Self::write_json(&self.communities_path(collection), communities).await
    }

    async fn load_communities(&self, collection: &CollectionKey) -> Result<Vec<Community>, StoreError> {
        Ok(Self::read_json(&self.communities_path(collection)).await?.unwrap_or_default())
    }

    async fn delete_communities(&self, collection: &CollectionKey) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.communities_path(collection)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
