//! AI enrichment stages over the transcript and episode metadata.
//!
//! All three stages (categorizer, Q&A generator, excerpt generator) sit
//! on one `Generator` seam, a chat-style text generation service. The
//! stages are independent of one another and run concurrently once the
//! transcript exists; a failure in one never blocks the others.

pub mod categorizer;
pub mod excerpt;
pub mod qa;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::GenerationConfig;
use crate::error::StageError;

pub use categorizer::Categorizer;
pub use excerpt::ExcerptGenerator;
pub use qa::QaGenerator;

/// Chat-style text generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for the given system/user prompt pair.
    async fn generate(&self, system: &str, user: &str) -> Result<String, StageError>;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, StageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StageError::EnrichmentService {
                stage: "generation".to_string(),
                message: format!("build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, system: &str, user: &str) -> Result<String, StageError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                json!({"role": "system", "content": system}),
                json!({"role": "user", "content": user}),
            ],
            temperature: 0.7,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StageError::EnrichmentService {
                stage: "generation".to_string(),
                message: format!("request failed: {}", e),
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(StageError::QuotaExceeded("chat completions: HTTP 429".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::EnrichmentService {
                stage: "generation".to_string(),
                message: format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                ),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| StageError::EnrichmentService {
                    stage: "generation".to_string(),
                    message: format!("parse response: {}", e),
                })?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| StageError::EnrichmentService {
                stage: "generation".to_string(),
                message: "empty completion".to_string(),
            })?;

        Ok(content)
    }
}
