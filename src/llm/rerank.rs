

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::extractor::strip_code_fence;
use super::providers::base::{LlmProvider, LlmProviderError};


#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// One relevance score in `[0, 1]` per document, in input order.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, LlmProviderError>;
}


#[async_trait]
impl RerankProvider for Arc<dyn RerankProvider> {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, LlmProviderError> {
        (**self).score(query, documents).await
    }
}


/// Min-max normalize into `[0, 1]`. A flat list maps to all ones.
pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    scores
        .iter()
        .map(|s| if range > f64::EPSILON { (s - min) / range } else { 1.0 })
        .collect()
}


#[derive(Deserialize)]
struct RerankReply {
    scores: Vec<f64>,
}

const RERANK_SYSTEM_PROMPT: &str = "你是检索结果相关性评估器。对每个候选文档给出与问题的相关度分数(0到10)。\
只输出 JSON: {\"scores\": [分数, ...]}, 顺序与候选文档一致。";

const RERANK_PREVIEW_CHARS: usize = 500;


pub struct LlmReranker<P: LlmProvider> {
    provider: P,
}

impl<P: LlmProvider> LlmReranker<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: LlmProvider> RerankProvider for LlmReranker<P> {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, LlmProviderError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut prompt = format!("问题: {}\n\n候选文档:\n", query);
        for (i, doc) in documents.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i, crate::safe_truncate(doc, RERANK_PREVIEW_CHARS)));
        }

        let (response, _) = self
            .provider
            .generate(RERANK_SYSTEM_PROMPT, &prompt, Some("json_object"))
            .await?;

        let reply: RerankReply = serde_json::from_str(strip_code_fence(&response))?;
        if reply.scores.len() != documents.len() {
            warn!(
                "Reranker returned {} scores for {} documents",
                reply.scores.len(),
                documents.len()
            );
            return Err(LlmProviderError::Provider("score count mismatch".to_string()));
        }

        debug!("Reranked {} documents", documents.len());
        Ok(min_max_normalize(&reply.scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::base::LlmMetadata;

    struct Canned(&'static str);

    #[async_trait]
    impl LlmProvider for Canned {
        async fn generate(
            &self,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> Result<(String, LlmMetadata), LlmProviderError> {
            Ok((self.0.to_string(), LlmMetadata::default()))
        }

        fn provider_name(&self) -> &str {
            "canned"
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_min_max_normalize() {
        assert_eq!(min_max_normalize(&[2.0, 4.0, 6.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(min_max_normalize(&[3.0, 3.0]), vec![1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_scores_are_normalized() {
        let reranker = LlmReranker::new(Canned(r#"{"scores": [0, 10, 5]}"#));
        let docs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(reranker.score("q", &docs).await.unwrap(), vec![0.0, 1.0, 0.5]);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_error() {
        let reranker = LlmReranker::new(Canned(r#"{"scores": [1]}"#));
        let docs = vec!["a".to_string(), "b".to_string()];
        assert!(reranker.score("q", &docs).await.is_err());
    }
}
