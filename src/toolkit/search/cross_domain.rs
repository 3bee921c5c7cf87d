

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::hybrid::HybridRetriever;
use crate::core::config::{CrossDomainConfig, RagConfig};
use crate::core::models::{Provenance, ResultKey, SearchResult, sort_by_score_desc};


pub struct CrossDomainRetriever {
    hybrid: Arc<HybridRetriever>,
    shared_domain: String,
    known_domains: Vec<String>,
    settings: CrossDomainConfig,
}

impl CrossDomainRetriever {
    pub fn new(hybrid: Arc<HybridRetriever>, config: &RagConfig) -> Self {
        Self {
            hybrid,
            shared_domain: config.shared_domain.clone(),
            known_domains: config.domain_names(),
            settings: config.cross_domain.clone(),
        }
    }

    /// Other domains to consult: targets (default all known) minus primary and
    /// shared, bounded by `max_other_domains`.
    pub fn other_domains(&self, primary: &str, targets: Option<&[String]>) -> Vec<String> {
        targets
            .unwrap_or(self.known_domains.as_slice())
            .iter()
            .filter(|d| d.as_str() != primary && **d != self.shared_domain)
            .take(self.settings.max_other_domains)
            .cloned()
            .collect()
    }

    pub async fn search(
        &self,
        query: &str,
        primary: &str,
        targets: Option<&[String]>,
        top_k: usize,
    ) -> Vec<SearchResult> {
        let embedding = match self.hybrid.embed_query(query).await {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Query embedding failed for cross-domain search: {}", e);
                None
            }
        };
        let embedding = embedding.as_deref();

        let primary_keys = self.hybrid.collections(&[primary.to_string()], None);
        let primary_search = self.hybrid.search_embedded(query, embedding, &primary_keys, top_k);

        let shared_search = async {
            if primary == self.shared_domain {
                return Vec::new();
            }
            let keys = self.hybrid.collections(std::slice::from_ref(&self.shared_domain), None);
            self.hybrid
                .search_embedded(query, embedding, &keys, self.settings.secondary_top_k)
                .await
        };

        let others = self.other_domains(primary, targets);
        let other_searches = join_all(others.iter().map(|domain| async move {
            let keys = self.hybrid.collections(std::slice::from_ref(domain), None);
            self.hybrid
                .search_embedded(query, embedding, &keys, self.settings.secondary_top_k)
                .await
        }));

        let (primary_results, shared_results, other_results) =
            futures::join!(primary_search, shared_search, other_searches);

        let shared_results = discount(shared_results, self.settings.shared_weight, Provenance::Shared);
        let other_results = discount(
            other_results.into_iter().flatten().collect(),
            self.settings.other_weight,
            Provenance::Cross,
        );

        let mut merged = merge_first_writer_wins([primary_results, shared_results, other_results]);
        merged.truncate(top_k);

        info!(
            "Cross-domain search (primary={}, others={:?}) returned {} results",
            primary,
            others,
            merged.len()
        );
        merged
    }
}

fn discount(results: Vec<SearchResult>, weight: f64, provenance: Provenance) -> Vec<SearchResult> {
    results
        .into_iter()
        .map(|r| {
            let score = r.score * weight;
            r.with_score(score).with_provenance(provenance)
        })
        .collect()
}

/// Sources in priority order; a key already taken is never overwritten.
pub fn merge_first_writer_wins<I>(sources: I) -> Vec<SearchResult>
where
    I: IntoIterator<Item = Vec<SearchResult>>,
{
    let mut seen: HashSet<ResultKey> = HashSet::new();
    let mut merged: Vec<SearchResult> = sources
        .into_iter()
        .flatten()
        .filter(|r| seen.insert(r.key()))
        .collect();
    sort_by_score_desc(&mut merged);
    merged
}
