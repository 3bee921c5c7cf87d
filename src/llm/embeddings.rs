

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::cache::{CacheStats, EmbeddingCache};
use crate::core::error::RagError;
use crate::core::resilience::RetryPolicy;


#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rate limited by embedding provider")]
    RateLimited,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty text")]
    EmptyText,

    #[error("Embedding unavailable: {0}")]
    Unavailable(String),
}

impl From<EmbeddingError> for RagError {
    fn from(err: EmbeddingError) -> Self {
        RagError::unavailable("embedding", err)
    }
}


#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn model_name(&self) -> &str;
}


#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}


pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    batch_size: usize,
    client: Client,
    cache: EmbeddingCache,
    retry: RetryPolicy,
}

impl OllamaEmbeddings {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        batch_size: usize,
        cache_size: usize,
        cache_ttl: u64,
        retry: RetryPolicy,
    ) -> Result<Self, EmbeddingError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();

        info!(
            "OllamaEmbeddings initialized: model={}, batch={}, cache={}",
            model, batch_size, cache_size
        );

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(retry.timeout_secs))
                .build()?,
            base_url,
            model,
            batch_size: batch_size.max(1),
            cache: EmbeddingCache::new(cache_size, cache_ttl),
            retry,
        })
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }

        let response = response
            .error_for_status()
            .map_err(EmbeddingError::Http)?
            .json::<OllamaEmbeddingResponse>()
            .await?;

        if response.embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse("empty embedding".to_string()));
        }
        Ok(response.embedding)
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(cached) = self.cache.get(text) {
            debug!("Cache HIT for: {}...", crate::safe_truncate(text, 50));
            return Ok(cached);
        }

        let embedding = self
            .retry
            .run("embedding", || async { self.embed_one(text).await })
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        self.cache.set(text, embedding.clone());
        Ok(embedding)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Embedding cache cleared");
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::EmptyText);
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!("Embedding batch {} ({} texts)", n + 1, batch.len());
            let embedded =
                futures::future::join_all(batch.iter().map(|t| self.embed_with_retry(t))).await;
            for embedding in embedded {
                vectors.push(embedding?);
            }
        }
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}


#[async_trait]
impl EmbeddingProvider for Arc<dyn EmbeddingProvider> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (**self).embed(texts).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
