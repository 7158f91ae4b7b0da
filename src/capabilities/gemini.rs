//! Google Generative Language API client.
//!
//! Implements both text generation (`generateContent`) and text embedding
//! (`embedContent`) against the same API surface. Responses are parsed
//! defensively - a missing candidate or vector is a protocol error, never a
//! panic.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    prompts, with_timeout, CapabilityError, GenerationRequest, QueryRows, SqlGenerator,
    TextEmbedder,
};
use crate::config::ServerConfig;

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    generation_model: String,
    embedding_model: String,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.gemini_api_key.clone(),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            generation_model: config.generation_model.clone(),
            embedding_model: config.embedding_model.clone(),
            timeout_secs: config.capability_timeout_secs,
        }
    }

    fn ensure_configured(&self, capability: &'static str) -> Result<(), CapabilityError> {
        if self.api_key.is_empty() {
            return Err(CapabilityError::NotConfigured {
                capability,
                detail: "GEMINI_API_KEY is not set".to_string(),
            });
        }
        Ok(())
    }

    async fn post_json(
        &self,
        capability: &'static str,
        url: String,
        body: Value,
    ) -> Result<Value, CapabilityError> {
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| CapabilityError::Transport {
                capability,
                detail: e.to_string(),
            })?;

        let status = response.status();
        let payload: Value =
            response
                .json()
                .await
                .map_err(|e| CapabilityError::Protocol {
                    capability,
                    detail: e.to_string(),
                })?;

        if !status.is_success() {
            let detail = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown upstream error")
                .to_string();
            return Err(CapabilityError::Transport {
                capability,
                detail: format!("HTTP {}: {}", status.as_u16(), detail),
            });
        }
        Ok(payload)
    }

    async fn generate_text(
        &self,
        capability: &'static str,
        prompt: String,
    ) -> Result<String, CapabilityError> {
        self.ensure_configured(capability)?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.generation_model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.1 }
        });

        let payload = with_timeout(capability, self.timeout_secs, async {
            self.post_json(capability, url, body).await
        })
        .await?;

        payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| CapabilityError::Protocol {
                capability,
                detail: "response contains no candidate text".to_string(),
            })
    }
}

#[async_trait]
impl TextEmbedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        const CAPABILITY: &str = "embedding";
        self.ensure_configured(CAPABILITY)?;
        let url = format!(
            "{}/models/{}:embedContent",
            self.base_url, self.embedding_model
        );
        let body = json!({ "content": { "parts": [{ "text": text }] } });

        let payload = with_timeout(CAPABILITY, self.timeout_secs, async {
            self.post_json(CAPABILITY, url, body).await
        })
        .await?;

        let values = payload
            .pointer("/embedding/values")
            .and_then(Value::as_array)
            .ok_or_else(|| CapabilityError::Protocol {
                capability: CAPABILITY,
                detail: "response contains no embedding values".to_string(),
            })?;

        values
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    CapabilityError::Protocol {
                        capability: CAPABILITY,
                        detail: "non-numeric embedding component".to_string(),
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl SqlGenerator for GeminiClient {
    async fn generate_sql(&self, request: &GenerationRequest) -> Result<String, CapabilityError> {
        self.generate_text("generation", prompts::generation_prompt(request))
            .await
    }

    async fn summarize_answer(
        &self,
        question: &str,
        rows: &QueryRows,
    ) -> Result<String, CapabilityError> {
        self.generate_text("summarization", prompts::summary_prompt(question, rows))
            .await
    }
}
