

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::orchestrator::{RetrievalOrchestrator, SearchRequest};
use super::search::merge_first_writer_wins;
use crate::core::models::SearchResult;
use crate::core::strategy::Strategy;
use crate::llm::{ChatTurn, GenerativeProvider};

const SECTION_MAX_CHARS: usize = 3000;
const CONTEXT_MAX_CHARS: usize = 8000;
const HISTORY_TURNS: usize = 5;
const SUPPLEMENT_TOP_K: usize = 3;

pub const APOLOGY: &str = "抱歉，处理您的问题时遇到了技术困难。请稍后再试或重新表述您的问题。";

const ZIWEI_PROMPT: &str = "你是紫微斗数命理大师，精通紫微斗数理论。

你的特点：
- 客观中立，不过度美化分析结果
- 直面困难，对不利格局直接指出问题
- 使用专业术语，如：命宫、官禄宫、财帛宫、化禄、化忌等
- 回答要有理有据，结合命盘分析
- 避免绝对化的承诺

分析时请：
1. 先明确问题涉及的宫位和星曜
2. 结合命盘特征进行分析
3. 给出客观的评价和建议";

const BAZI_PROMPT: &str = "你是八字命理大师，精通八字命理理论。

你的特点：
- 客观分析日主强弱
- 准确判断用神喜忌
- 结合格局进行分析
- 避免绝对化承诺

分析时请：
1. 明确日主状态（身强/身弱）
2. 分析用神是否得力
3. 结合大运流年判断";

const QIMEN_PROMPT: &str = "你是奇门遁甲大师，精通奇门遁甲理论。

你的特点：
- 熟悉九星、八门、八神的含义
- 能判断格局吉凶
- 结合具体事情分析";

const SHARED_PROMPT: &str = "你是命理学专家，精通五行、天干地支等基础理论。

你的特点：
- 解释基础概念清晰准确
- 能融会贯通各派理论
- 回答简洁明了";


pub fn system_prompt(domain: &str) -> &'static str {
    match domain {
        "ziwei" => ZIWEI_PROMPT,
        "bazi" => BAZI_PROMPT,
        "qimen" => QIMEN_PROMPT,
        _ => SHARED_PROMPT,
    }
}


/// Source-tagged sections joined by separators, cut at the total budget.
pub fn build_context(results: &[SearchResult]) -> String {
    let context = results
        .iter()
        .map(|r| {
            format!(
                "【来源: {}/{}】\n{}",
                r.domain,
                r.category,
                crate::safe_truncate(&r.content, SECTION_MAX_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    if context.chars().count() > CONTEXT_MAX_CHARS {
        format!("{}\n...(内容已截断)", crate::safe_truncate(&context, CONTEXT_MAX_CHARS))
    } else {
        context
    }
}


#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub query: String,
    pub domain: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<SearchResult>,
    pub strategy: Strategy,
    pub entities: Vec<String>,
    pub elapsed_ms: u64,
}


pub struct AnswerComposer {
    orchestrator: Arc<RetrievalOrchestrator>,
    generator: Arc<dyn GenerativeProvider>,
}

impl AnswerComposer {
    pub fn new(orchestrator: Arc<RetrievalOrchestrator>, generator: Arc<dyn GenerativeProvider>) -> Self {
        Self { orchestrator, generator }
    }

    pub async fn answer(&self, request: AnswerRequest) -> Answer {
        let started = Instant::now();
        let services = self.orchestrator.services();

        let mut search = SearchRequest::new(request.query.clone()).domains([request.domain.clone()]);
        search.categories = request.category.clone().map(|c| vec![c]);
        search.top_k = request.top_k;
        let outcome = self.orchestrator.search(search).await;

        let mut sources = outcome.results;
        if services.planner.needs_cross_domain(&request.query, &outcome.context) {
            let targets = [request.domain.clone(), services.config.shared_domain.clone()];
            let supplement = services
                .cross_domain
                .search(&request.query, &request.domain, Some(targets.as_slice()), SUPPLEMENT_TOP_K)
                .await;
            debug!("Cross-domain supplement added {} candidates", supplement.len());
            sources = merge_first_writer_wins([sources, supplement]);
        }

        let system_prompts = vec![
            system_prompt(&request.domain).to_string(),
            format!("参考知识:\n{}", build_context(&sources)),
        ];
        let history_start = request.history.len().saturating_sub(HISTORY_TURNS);
        let history = &request.history[history_start..];

        let response = match self.generator.complete(&system_prompts, history, &request.query).await {
            Ok(text) => text,
            Err(e) => {
                error!("Answer generation failed: {}", e);
                APOLOGY.to_string()
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Answered '{}' with {} sources via {} in {}ms",
            crate::safe_truncate(&request.query, 40),
            sources.len(),
            outcome.strategy,
            elapsed_ms
        );

        Answer {
            response,
            sources,
            strategy: outcome.strategy,
            entities: outcome.context.entities,
            elapsed_ms,
        }
    }
}
