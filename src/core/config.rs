

use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{RagError, Result};
use super::resilience::RetryPolicy;
use crate::toolkit::planner::PlanRule;
use crate::toolkit::router::RoutingRules;


pub const CONFIG_FILE: &str = "destiny-rag";
pub const ENV_PREFIX: &str = "DESTINY_RAG";


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub categories: Vec<String>,
}

impl DomainConfig {
    pub fn new(name: &str, label: &str, categories: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub content_prefix_chars: usize,
    pub min_entity_chars: usize,
    pub community_min_entities: usize,
    pub summary_preview: usize,
    pub communities_per_domain: usize,
    pub extraction_concurrency: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            content_prefix_chars: 3000,
            min_entity_chars: 2,
            community_min_entities: 5,
            summary_preview: 10,
            communities_per_domain: 3,
            extraction_concurrency: 4,
        }
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossDomainConfig {
    pub shared_weight: f64,
    pub other_weight: f64,
    pub max_other_domains: usize,
    pub secondary_top_k: usize,
}

impl Default for CrossDomainConfig {
    fn default() -> Self {
        Self {
            shared_weight: 0.8,
            other_weight: 0.6,
            max_other_domains: 2,
            secondary_top_k: 3,
        }
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f64,

    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_batch_size: usize,
    pub embedding_cache_size: usize,
    pub embedding_cache_ttl: u64,

    pub graph_dir: Option<String>,

    pub default_top_k: usize,
    pub hybrid_vector_weight: f64,
    pub hybrid_keyword_weight: f64,
    pub bm25_k1: f64,
    pub bm25_b: f64,
    pub enable_rerank: bool,

    pub complex_query_length_threshold: usize,
    pub complex_entity_threshold: usize,

    pub enable_cross_domain: bool,
    pub shared_concepts: Vec<String>,
    pub shared_domain: String,
    pub default_domain: String,
    pub catch_all_category: String,
    pub domains: Vec<DomainConfig>,

    pub retry: RetryPolicy,
    pub graph: GraphConfig,
    pub cross_domain: CrossDomainConfig,

    pub search_cache_size: usize,
    pub search_cache_ttl: u64,

    pub routing: RoutingRules,
    pub planner_rules: Vec<PlanRule>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            llm_base_url: crate::DEFAULT_OLLAMA_URL.to_string(),
            llm_model: crate::DEFAULT_LLM_MODEL.to_string(),
            llm_temperature: 0.1,

            embedding_url: crate::DEFAULT_OLLAMA_URL.to_string(),
            embedding_model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_batch_size: 100,
            embedding_cache_size: crate::DEFAULT_CACHE_SIZE,
            embedding_cache_ttl: crate::DEFAULT_CACHE_TTL,

            graph_dir: None,

            default_top_k: 10,
            hybrid_vector_weight: 0.6,
            hybrid_keyword_weight: 0.4,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            enable_rerank: false,

            complex_query_length_threshold: 50,
            complex_entity_threshold: 2,

            enable_cross_domain: true,
            shared_concepts: ["五行", "天干", "地支", "用神", "喜忌", "大运", "流年"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            shared_domain: "shared".to_string(),
            default_domain: "ziwei".to_string(),
            catch_all_category: "general".to_string(),
            domains: default_domains(),

            retry: RetryPolicy::default(),
            graph: GraphConfig::default(),
            cross_domain: CrossDomainConfig::default(),

            search_cache_size: 256,
            search_cache_ttl: crate::DEFAULT_CACHE_TTL,

            routing: RoutingRules::default(),
            planner_rules: PlanRule::default_rules(),
        }
    }
}

pub fn default_domains() -> Vec<DomainConfig> {
    vec![
        DomainConfig::new("shared", "共通知识", &["basic"]),
        DomainConfig::new(
            "ziwei",
            "紫微斗数",
            &["palace", "star", "transformation", "fortune", "pattern"],
        ),
        DomainConfig::new("bazi", "八字命理", &["structure", "yongshen", "ten_gods", "dayun"]),
        DomainConfig::new(
            "qimen",
            "奇门遁甲",
            &["nine_star", "eight_door", "eight_god", "formation"],
        ),
        DomainConfig::new("liuyao", "六爻预测", &["gua", "liuyao_yongshen", "shiyin"]),
        DomainConfig::new("shouxiang", "手相占卜", &["palm", "finger", "mount", "line"]),
    ]
}

impl RagConfig {
    /// Optional `destiny-rag.{toml,json,yaml}` file, then `DESTINY_RAG__*` env vars.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path.unwrap_or(CONFIG_FILE)).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("shared_concepts"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        info!(
            "Config loaded: {} domains, cross_domain={}, llm={}",
            config.domains.len(),
            config.enable_cross_domain,
            config.llm_model
        );
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("llm_base_url", &self.llm_base_url), ("embedding_url", &self.embedding_url)] {
            url::Url::parse(value)
                .map_err(|e| RagError::Config(format!("{} '{}' is not a valid URL: {}", name, value, e)))?;
        }

        for (name, weight) in [
            ("hybrid_vector_weight", self.hybrid_vector_weight),
            ("hybrid_keyword_weight", self.hybrid_keyword_weight),
            ("cross_domain.shared_weight", self.cross_domain.shared_weight),
            ("cross_domain.other_weight", self.cross_domain.other_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(RagError::Config(format!("{} must be within [0, 1], got {}", name, weight)));
            }
        }

        if self.default_top_k == 0 {
            return Err(RagError::Config("default_top_k must be positive".to_string()));
        }
        if self.complex_query_length_threshold == 0 {
            return Err(RagError::Config(
                "complex_query_length_threshold must be positive".to_string(),
            ));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Config("embedding_batch_size must be positive".to_string()));
        }
        if self.domains.is_empty() {
            return Err(RagError::Config("at least one domain must be configured".to_string()));
        }

        Ok(())
    }

    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Configured categories for a domain, or the catch-all bucket.
    pub fn categories_for(&self, domain: &str) -> Vec<String> {
        match self.domain(domain) {
            Some(d) if !d.categories.is_empty() => d.categories.clone(),
            _ => vec![self.catch_all_category.clone()],
        }
    }

    pub fn domain_names(&self) -> Vec<String> {
        self.domains.iter().map(|d| d.name.clone()).collect()
    }
}
