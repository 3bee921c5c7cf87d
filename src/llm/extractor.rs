

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::providers::base::{LlmProvider, LlmProviderError};
use crate::core::models::Relation;


#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl ExtractionOutput {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}


/// Entity and relation extraction over a single document.
///
/// Implementations parse model output defensively: unparsable replies yield an
/// empty [`ExtractionOutput`], and only transport failures surface as errors.
#[async_trait]
pub trait EntityExtractionProvider: Send + Sync {
    async fn extract(&self, content: &str, title: &str) -> Result<ExtractionOutput, LlmProviderError>;
}


const EXTRACTION_SYSTEM_PROMPT: &str = r#"你是命理知识图谱构建助手。从给定文本中抽取实体和关系。

实体类型: 星曜, 宫位, 四化, 格局, 十神, 用神, 五行, 天干, 地支, 概念

只输出 JSON, 结构如下:
{
  "entities": [
    {"name": "实体名", "type": "实体类型", "description": "简短描述"}
  ],
  "relations": [
    {"source": "源实体", "target": "目标实体", "type": "关系类型", "description": "关系说明"}
  ]
}"#;


pub struct LlmEntityExtractor<P: LlmProvider> {
    provider: P,
}

impl<P: LlmProvider> LlmEntityExtractor<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn build_user_prompt(content: &str, title: &str) -> String {
        format!("标题: {}\n\n内容:\n{}", title, content)
    }
}

#[async_trait]
impl<P: LlmProvider> EntityExtractionProvider for LlmEntityExtractor<P> {
    async fn extract(&self, content: &str, title: &str) -> Result<ExtractionOutput, LlmProviderError> {
        debug!("Extracting entities from '{}'", crate::safe_truncate(title, 40));

        let (response, metadata) = self
            .provider
            .generate(
                EXTRACTION_SYSTEM_PROMPT,
                &Self::build_user_prompt(content, title),
                Some("json_object"),
            )
            .await?;

        let output = parse_extraction(&response);
        info!(
            "Extracted {} entities, {} relations via {}",
            output.entities.len(),
            output.relations.len(),
            metadata.model
        );
        Ok(output)
    }
}


#[async_trait]
impl EntityExtractionProvider for Arc<dyn EntityExtractionProvider> {
    async fn extract(&self, content: &str, title: &str) -> Result<ExtractionOutput, LlmProviderError> {
        (**self).extract(content, title).await
    }
}


/// Strip an optional Markdown code fence around a JSON payload.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_extraction(raw: &str) -> ExtractionOutput {
    match serde_json::from_str::<ExtractionOutput>(strip_code_fence(raw)) {
        Ok(output) => output,
        Err(e) => {
            warn!("Malformed extraction output, treating as empty: {}", e);
            ExtractionOutput::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::base::LlmMetadata;

    struct CannedProvider(String);

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn generate(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
            _response_format: Option<&str>,
        ) -> Result<(String, LlmMetadata), LlmProviderError> {
            assert!(user_prompt.starts_with("标题:"));
            Ok((self.0.clone(), LlmMetadata::default()))
        }

        fn provider_name(&self) -> &str {
            "canned"
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_fenced_reply_is_parsed() {
        let reply = r#"```json
{"entities":[{"name":"紫微","type":"星曜"}],"relations":[{"source":"紫微","target":"天府","type":"同宫"}]}
```"#;
        let extractor = LlmEntityExtractor::new(CannedProvider(reply.to_string()));
        let output = extractor.extract("紫微天府同宫", "紫府").await.unwrap();
        assert_eq!(output.entities[0].name, "紫微");
        assert_eq!(output.entities[0].entity_type, "星曜");
        assert_eq!(output.relations[0].relation_type, "同宫");
    }

    #[tokio::test]
    async fn test_malformed_reply_degrades_to_empty() {
        let extractor = LlmEntityExtractor::new(CannedProvider("不是JSON".to_string()));
        let output = extractor.extract("内容", "标题").await.unwrap();
        assert!(output.is_empty());
    }
}
