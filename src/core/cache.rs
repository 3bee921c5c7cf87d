

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::debug;

use super::error::Result;


/// Per-key lazily built values. Concurrent callers asking for the same key
/// share one in-flight build; `invalidate` forces the next access to rebuild.
pub struct LazyIndexCache<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<Arc<V>>>>>,
    builds: AtomicU64,
}

impl<K, V> LazyIndexCache<K, V>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            builds: AtomicU64::new(0),
        }
    }

    pub async fn get_or_try_build<F, Fut>(&self, key: &K, build: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let cell = {
            let mut cells = self.cells.lock();
            Arc::clone(cells.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let value = cell
            .get_or_try_init(|| async {
                self.builds.fetch_add(1, Ordering::SeqCst);
                debug!("Building cached index for {}", key);
                build().await.map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(value))
    }

    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        let cells = self.cells.lock();
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    pub fn invalidate(&self, key: &K) {
        if self.cells.lock().remove(key).is_some() {
            debug!("Invalidated cached index for {}", key);
        }
    }

    pub fn invalidate_where(&self, mut predicate: impl FnMut(&K) -> bool) {
        self.cells.lock().retain(|key, _| !predicate(key));
    }

    /// Number of builds started since creation.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for LazyIndexCache<K, V>
where
    K: Eq + Hash + Clone + Display,
{
    fn default() -> Self {
        Self::new()
    }
}


pub struct EmbeddingCache {
    cache: RwLock<HashMap<String, CacheEntry>>,
    max_size: usize,
    ttl: Duration,
    stats: RwLock<CacheStats>,
}

struct CacheEntry {
    embedding: Vec<f32>,
    created_at: Instant,
}

#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl EmbeddingCache {
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_size,
            ttl: Duration::from_secs(ttl_secs),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let hit = {
            let cache = self.cache.read();
            cache
                .get(text)
                .filter(|entry| entry.created_at.elapsed() < self.ttl)
                .map(|entry| entry.embedding.clone())
        };

        let mut stats = self.stats.write();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    pub fn set(&self, text: &str, embedding: Vec<f32>) {
        if self.max_size == 0 {
            return;
        }

        let mut cache = self.cache.write();

        if cache.len() >= self.max_size && !cache.contains_key(text) {
            if let Some(oldest_key) = cache
                .iter()
                .min_by_key(|(_, v)| v.created_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest_key);
            }
        }

        cache.insert(
            text.to_string(),
            CacheEntry {
                embedding,
                created_at: Instant::now(),
            },
        );

        self.stats.write().size = cache.len();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    pub fn clear(&self) {
        self.cache.write().clear();
        self.stats.write().size = 0;
    }
}
