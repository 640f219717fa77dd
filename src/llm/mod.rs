//! Text generation over OpenAI-compatible chat completion APIs
//!
//! Groq is the default endpoint; any server exposing
//! `POST {endpoint}/chat/completions` works.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::config::LlmConfig;
use crate::errors::QaError;
use crate::errors::Result;

/// Text-completion capability used by the orchestrator
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Complete a two-message conversation and return the raw reply text.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// One chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

/// Chat completion client
pub struct LlmService {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    client: Client,
}

impl LlmService {
    /// Create a new LLM client
    ///
    /// # Errors
    /// - Missing API key (`llm.llm_key`, `LLM_API_KEY` or `GROQ_API_KEY`)
    /// - HTTP client build errors
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.llm_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
            QaError::Config(
                "llm.llm_key (or LLM_API_KEY / GROQ_API_KEY) is required for generation"
                    .to_string(),
            )
        })?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QaError::GenerationService(e.to_string()))?;

        info!("Using model '{}' for generation", config.llm_model);

        Ok(Self {
            endpoint: config.llm_endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: config.llm_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a chat conversation and return the first choice's content
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| QaError::GenerationService(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QaError::GenerationService(format!(
                "chat completion failed ({status}): {error_text}"
            )));
        }

        let result: ChatResponse = response.json().await.map_err(|e| {
            QaError::GenerationService(format!("Failed to parse response: {e}"))
        })?;
        debug!("Chat completion took {:?}", started.elapsed());

        first_content(result)
    }
}

fn first_content(response: ChatResponse) -> Result<String> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| QaError::GenerationService("no choices returned".to_string()))?;
    choice
        .message
        .map(|m| m.content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| QaError::GenerationService("empty completion".to_string()))
}

#[async_trait]
impl GenerationService for LlmService {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.chat(vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ])
        .await
    }
}
