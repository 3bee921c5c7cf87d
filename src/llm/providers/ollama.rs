

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::base::{ChatTurn, GenerativeProvider, LlmMetadata, LlmProvider, LlmProviderError};

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}


pub struct OllamaProvider {
    base_url: String,
    model: String,
    temperature: f64,
    client: Client,
}

impl OllamaProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
        timeout_secs: u64,
    ) -> Result<Self, LlmProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        info!("Ollama provider initialized (model={}, url={})", model, base_url);
        Ok(Self {
            base_url,
            model,
            temperature,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()?,
        })
    }

    async fn chat(
        &self,
        messages: Vec<OllamaMessage>,
        format: Option<String>,
        temperature: f64,
    ) -> Result<(String, LlmMetadata), LlmProviderError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            options: OllamaOptions { temperature },
            format,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmProviderError::RateLimited(format!(
                "{} returned 429",
                self.base_url
            )));
        }

        let response = response
            .error_for_status()
            .map_err(LlmProviderError::Http)?
            .json::<OllamaResponse>()
            .await?;

        debug!(
            "Ollama chat complete: {} prompt / {} completion tokens",
            response.prompt_eval_count, response.eval_count
        );

        let metadata = LlmMetadata {
            provider: "ollama".to_string(),
            model: self.model.clone(),
            base_url: Some(self.base_url.clone()),
            tokens_prompt: Some(response.prompt_eval_count),
            tokens_completion: Some(response.eval_count),
            tokens_total: Some(response.prompt_eval_count + response.eval_count),
        };

        Ok((response.message.content, metadata))
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_format: Option<&str>,
    ) -> Result<(String, LlmMetadata), LlmProviderError> {
        let messages = vec![
            OllamaMessage {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            },
            OllamaMessage {
                role: "user".to_string(),
                content: user_prompt.to_string(),
            },
        ];

        let format = if response_format == Some("json_object") {
            Some("json".to_string())
        } else {
            None
        };

        self.chat(messages, format, self.temperature).await
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerativeProvider for OllamaProvider {
    async fn complete(
        &self,
        system_prompts: &[String],
        history: &[ChatTurn],
        user_query: &str,
    ) -> Result<String, LlmProviderError> {
        let mut messages: Vec<OllamaMessage> = system_prompts
            .iter()
            .map(|content| OllamaMessage {
                role: "system".to_string(),
                content: content.clone(),
            })
            .collect();

        messages.extend(history.iter().map(|turn| OllamaMessage {
            role: turn.role.clone(),
            content: turn.content.clone(),
        }));

        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: user_query.to_string(),
        });

        // answers read better with more sampling freedom than extraction
        let temperature = self.temperature.max(0.7);
        let (content, _metadata) = self.chat(messages, None, temperature).await?;
        Ok(content)
    }
}
