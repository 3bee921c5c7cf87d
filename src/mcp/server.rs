

use rmcp::{
    handler::server::{
        router::tool::ToolRouter,
        router::prompt::PromptRouter,
        wrapper::Parameters,
    },
    model::*,
    tool, tool_handler, tool_router,
    prompt, prompt_handler, prompt_router,
    transport::stdio,
    service::RequestContext,
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{info, warn};

use crate::core::config::RagConfig;
use crate::core::error::RagError;
use crate::core::models::{KnowledgeEntry, KnowledgeLevel};
use crate::core::strategy::Strategy;
use crate::db::{Bm25Index, GraphStore, JsonGraphStore, MemoryGraphStore, MemoryVectorStore};
use crate::llm::{
    ChatTurn, GenerativeProvider, LlmEntityExtractor, LlmProvider, LlmReranker, OllamaEmbeddings,
    OllamaProvider, RerankProvider,
};
use crate::toolkit::{
    AnswerComposer, AnswerRequest, Collaborators, RetrievalOrchestrator, SearchRequest, ServiceRegistry,
};


#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct SearchKnowledgeParams {
    #[schemars(description = "Natural-language question")]
    pub query: String,
    #[schemars(description = "Domains to search, primary first (default: configured default domain)")]
    pub domains: Option<Vec<String>>,
    #[schemars(description = "Restrict to these categories")]
    pub categories: Option<Vec<String>>,
    #[schemars(
        description = "Force a strategy: 'hybrid_vector', 'graph_local', 'graph_global', 'cross_type'"
    )]
    pub strategy: Option<String>,
    #[schemars(description = "Max results (default: 10)")]
    pub top_k: Option<usize>,
    #[schemars(description = "Entities for graph_local search")]
    pub entities: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ClassifyQueryParams {
    #[schemars(description = "Natural-language question")]
    pub query: String,
    #[schemars(description = "Primary domain used for planning")]
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct KnowledgeEntryParams {
    pub id: String,
    pub title: String,
    pub content: String,
    #[schemars(description = "'basic', 'method' or 'advanced'")]
    pub level: Option<String>,
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct IndexKnowledgeParams {
    #[schemars(description = "Domain, e.g. 'ziwei', 'bazi', 'shared'")]
    pub domain: String,
    #[schemars(description = "Category within the domain, e.g. 'star'")]
    pub category: String,
    #[schemars(description = "Entries that replace the collection's contents")]
    pub entries: Vec<KnowledgeEntryParams>,
    #[schemars(description = "Wait for the knowledge graph build (default: false)")]
    pub wait_for_graph: Option<bool>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ChatTurnParams {
    #[schemars(description = "'user' or 'assistant'")]
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct AnswerQuestionParams {
    #[schemars(description = "Natural-language question")]
    pub query: String,
    #[schemars(description = "Domain of the question (default: configured default domain)")]
    pub domain: Option<String>,
    pub category: Option<String>,
    pub top_k: Option<usize>,
    #[schemars(description = "Previous turns; only the last five are used")]
    pub history: Option<Vec<ChatTurnParams>>,
}


#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadingGuideArgs {
    #[schemars(description = "Domain to focus on, e.g. 'ziwei'")]
    pub domain: String,
    #[schemars(description = "Optional topic")]
    pub topic: Option<String>,
}


#[derive(Clone)]
pub struct DestinyRagMcpServer {
    orchestrator: Arc<RetrievalOrchestrator>,
    composer: Option<Arc<AnswerComposer>>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

impl DestinyRagMcpServer {
    pub fn new(orchestrator: Arc<RetrievalOrchestrator>, composer: Option<Arc<AnswerComposer>>) -> Self {
        Self {
            orchestrator,
            composer,
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    fn convert_error(err: RagError) -> McpError {
        match err {
            RagError::Config(msg) => McpError::invalid_params(msg, None),
            RagError::UnknownStrategy(s) => McpError::invalid_params(format!("unknown strategy '{}'", s), None),
            other => McpError::internal_error(other.to_string(), None),
        }
    }

    fn result_to_json<T: Serialize>(result: T) -> Result<String, McpError> {
        serde_json::to_string_pretty(&result)
            .map_err(|e| McpError::internal_error(e.to_string(), None))
    }

    fn config(&self) -> &RagConfig {
        &self.orchestrator.services().config
    }
}

#[tool_router]
impl DestinyRagMcpServer {
    #[tool(description = "Search the divination knowledge base. The strategy (hybrid_vector, graph_local, graph_global, cross_type) is planned from the query unless forced. Returns: {results: [...], strategy, context, elapsed_ms}")]
    async fn search_knowledge(
        &self,
        Parameters(params): Parameters<SearchKnowledgeParams>,
    ) -> Result<CallToolResult, McpError> {
        let strategy = params
            .strategy
            .as_deref()
            .map(Strategy::try_parse)
            .transpose()
            .map_err(Self::convert_error)?;

        info!(
            "🔍 Searching: '{}' [strategy={:?}, domains={:?}]",
            crate::safe_truncate(&params.query, 50),
            strategy,
            params.domains
        );

        let request = SearchRequest {
            query: params.query,
            strategy,
            domains: params.domains.unwrap_or_default(),
            categories: params.categories,
            top_k: params.top_k,
            entities: params.entities,
        };
        let outcome = self.orchestrator.search(request).await;

        info!("✅ {} results via {}", outcome.results.len(), outcome.strategy);

        let json = Self::result_to_json(&outcome)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Classify a question without searching. Returns: {context: {query_type, is_complex, entities}, strategy, cost}")]
    async fn classify_query(
        &self,
        Parameters(params): Parameters<ClassifyQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let domain = params
            .domain
            .unwrap_or_else(|| self.config().default_domain.clone());
        let (context, strategy) = self.orchestrator.plan(&params.query, &domain);

        let json = Self::result_to_json(json!({
            "context": context,
            "strategy": strategy,
            "description": strategy.description(),
            "cost": strategy.estimate_cost(),
        }))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Index entries into one (domain, category) collection, replacing its contents, and build its knowledge graph. Returns: {job_id, documents_indexed, graph}")]
    async fn index_knowledge(
        &self,
        Parameters(params): Parameters<IndexKnowledgeParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "📚 Indexing {} entries into {}/{}",
            params.entries.len(),
            params.domain,
            params.category
        );

        let entries: Vec<KnowledgeEntry> = params
            .entries
            .into_iter()
            .map(|e| KnowledgeEntry {
                id: e.id,
                title: e.title,
                content: e.content,
                domain: params.domain.clone(),
                category: params.category.clone(),
                level: e
                    .level
                    .and_then(|l| l.parse::<KnowledgeLevel>().ok())
                    .unwrap_or_default(),
                entities: Vec::new(),
                relations: Vec::new(),
                keywords: e.keywords.unwrap_or_default(),
            })
            .collect();

        let handle = self
            .orchestrator
            .index(&params.domain, &params.category, entries)
            .await
            .map_err(Self::convert_error)?;
        let job_id = handle.job_id;
        let documents_indexed = handle.documents_indexed;

        let graph = if params.wait_for_graph.unwrap_or(false) {
            let report = handle.wait().await.map_err(Self::convert_error)?;
            json!(report)
        } else {
            handle.detach();
            json!("building")
        };

        info!("✅ Indexed {} documents (job {})", documents_indexed, job_id);

        let json = Self::result_to_json(json!({
            "job_id": job_id,
            "documents_indexed": documents_indexed,
            "graph": graph,
        }))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Answer a question from retrieved knowledge with the configured LLM. Returns: {response, sources, strategy, entities, elapsed_ms}")]
    async fn answer_question(
        &self,
        Parameters(params): Parameters<AnswerQuestionParams>,
    ) -> Result<CallToolResult, McpError> {
        let Some(composer) = &self.composer else {
            warn!("⚠️ answer_question called without a generator");
            return Err(McpError::invalid_request("answer generation is not configured", None));
        };

        let request = AnswerRequest {
            query: params.query,
            domain: params
                .domain
                .unwrap_or_else(|| self.config().default_domain.clone()),
            category: params.category,
            top_k: params.top_k,
            history: params
                .history
                .unwrap_or_default()
                .into_iter()
                .map(|t| ChatTurn::new(t.role, t.content))
                .collect(),
        };
        let answer = composer.answer(request).await;

        let json = Self::result_to_json(&answer)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}


#[prompt_router]
impl DestinyRagMcpServer {
    #[prompt(
        name = "reading_guide",
        description = "Prompt to study a domain topic with the knowledge tools"
    )]
    async fn reading_guide(
        &self,
        Parameters(args): Parameters<ReadingGuideArgs>,
    ) -> Result<GetPromptResult, McpError> {
        let topic = args.topic
            .map(|t| format!("，重点: {}", t))
            .unwrap_or_default();

        let messages = vec![
            PromptMessage::new_text(
                PromptMessageRole::User,
                format!(
                    "请梳理 {} 领域的知识{}。

先用 classify_query 查看问题类型与检索策略，
再用 search_knowledge 检索相关条目，
最后按来源整理要点，注明每条结论的出处。",
                    args.domain,
                    topic
                ),
            ),
        ];

        Ok(GetPromptResult {
            description: Some(format!("Reading guide for {}", args.domain)),
            messages,
        })
    }
}


#[tool_handler]
#[prompt_handler]
impl ServerHandler for DestinyRagMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "destiny-rag".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Strategy-routed retrieval over divination knowledge (ziwei, bazi, qimen, liuyao, \
                 shouxiang, shared). Use search_knowledge to retrieve, classify_query to inspect \
                 routing, index_knowledge to load a collection."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: vec![
                RawResource::new("config://destiny-rag", "destiny-rag-config".to_string())
                    .no_annotation(),
                RawResource::new("stats://search-cache", "search-cache-stats".to_string())
                    .no_annotation(),
            ],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let content = match uri.as_str() {
            "config://destiny-rag" => {
                let config = self.config();
                json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "domains": config.domains,
                    "default_domain": config.default_domain,
                    "enable_cross_domain": config.enable_cross_domain,
                    "llm": {
                        "url": config.llm_base_url,
                        "model": config.llm_model,
                    },
                    "embedding": {
                        "url": config.embedding_url,
                        "model": config.embedding_model,
                    },
                    "strategies": Strategy::iter()
                        .map(|s| json!({"name": s.as_str(), "description": s.description()}))
                        .collect::<Vec<_>>(),
                })
            }
            "stats://search-cache" => {
                let stats = self.orchestrator.cache_stats();
                json!({
                    "hits": stats.hits,
                    "misses": stats.misses,
                    "size": stats.size,
                    "hit_rate": stats.hit_rate,
                })
            }
            _ => {
                return Err(McpError::resource_not_found(
                    format!("Unknown resource: {}", uri),
                    Some(json!({ "uri": uri })),
                ));
            }
        };

        let text = Self::result_to_json(content)?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, uri)],
        })
    }
}


/// Wire the reference collaborators from configuration.
pub async fn build_collaborators(config: &RagConfig) -> anyhow::Result<Collaborators> {
    let ollama = Arc::new(OllamaProvider::new(
        config.llm_base_url.clone(),
        config.llm_model.clone(),
        config.llm_temperature,
        config.retry.timeout_secs,
    )?);
    let llm: Arc<dyn LlmProvider> = ollama.clone();
    let generator: Arc<dyn GenerativeProvider> = ollama;

    let embedder = OllamaEmbeddings::new(
        config.embedding_url.clone(),
        config.embedding_model.clone(),
        config.embedding_batch_size,
        config.embedding_cache_size,
        config.embedding_cache_ttl,
        config.retry.clone(),
    )?;

    let graph_store: Arc<dyn GraphStore> = match &config.graph_dir {
        Some(dir) => Arc::new(JsonGraphStore::open(dir).await?),
        None => Arc::new(MemoryGraphStore::new()),
    };

    let reranker: Option<Arc<dyn RerankProvider>> = if config.enable_rerank {
        Some(Arc::new(LlmReranker::new(Arc::clone(&llm))))
    } else {
        None
    };

    Ok(Collaborators {
        vector_store: Arc::new(MemoryVectorStore::new()),
        keyword_index: Arc::new(Bm25Index::new(config.bm25_k1, config.bm25_b)),
        embedder: Arc::new(embedder),
        extractor: Arc::new(LlmEntityExtractor::new(llm)),
        graph_store,
        reranker,
        generator: Some(generator),
    })
}


pub async fn run_server(config_path: Option<&str>) -> anyhow::Result<()> {
    info!("🚀 Initializing destiny-rag MCP Server...");

    let config = RagConfig::load(config_path)?;
    let collaborators = build_collaborators(&config).await?;
    let generator = collaborators.generator.clone();

    let registry = Arc::new(ServiceRegistry::new(config, collaborators)?);
    let orchestrator = Arc::new(RetrievalOrchestrator::new(Arc::clone(&registry)));
    let composer = generator.map(|g| Arc::new(AnswerComposer::new(Arc::clone(&orchestrator), g)));

    info!("✅ destiny-rag MCP Server ready");
    info!(
        "   🤖 LLM: {} @ {}",
        registry.config.llm_model,
        registry.config.llm_base_url
    );
    info!("   🧭 Domains: {:?}", registry.config.domain_names());
    match &registry.config.graph_dir {
        Some(dir) => info!("   🕸️ Graphs persisted to {}", dir),
        None => warn!("⚠️ No graph_dir configured, graphs are kept in memory"),
    }

    let server = DestinyRagMcpServer::new(orchestrator, composer);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
