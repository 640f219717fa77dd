//! Embedding API clients for remote providers

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::check_dimension;
use super::Embedder;
use crate::config::EmbeddingsConfig;
use crate::errors::QaError;
use crate::errors::Result;

/// Supported remote embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// `OpenAI`-compatible embeddings API
    OpenAI,
    /// Ollama local embeddings
    Ollama,
}

/// Client for generating question embeddings over HTTP
pub struct EmbeddingClient {
    provider: EmbeddingProvider,
    model: String,
    dimension: usize,
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl EmbeddingClient {
    /// Create a new embedding client
    ///
    /// # Errors
    /// - HTTP client build errors (invalid configuration)
    pub fn new(
        provider: EmbeddingProvider,
        model: String,
        dimension: usize,
        endpoint: String,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| QaError::Embedding(e.to_string()))?;

        Ok(Self {
            provider,
            model,
            dimension,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn from_config(provider: EmbeddingProvider, config: &EmbeddingsConfig) -> Result<Self> {
        Self::new(
            provider,
            config.model.clone(),
            config.dimension,
            config.endpoint.clone(),
            config.api_key.clone(),
            config.timeout_secs,
        )
    }

    /// Generate embedding for a single text
    ///
    /// # Errors
    /// - API request failures (network errors, timeouts, authentication failures)
    /// - Invalid API responses (malformed JSON, wrong embedding dimensions)
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = match self.provider {
            EmbeddingProvider::OpenAI => self.generate_openai(text).await?,
            EmbeddingProvider::Ollama => self.generate_ollama(text).await?,
        };
        check_dimension(&embedding, self.dimension)?;
        Ok(embedding)
    }

    /// Generate embedding using `OpenAI` API
    async fn generate_openai(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            QaError::Config("embeddings.api_key (or EMBEDDING_API_KEY) not provided".to_string())
        })?;

        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            input: &'a str,
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }

        let url = format!("{}/embeddings", self.endpoint);
        debug!("Calling OpenAI embeddings API: {}", url);

        let request = OpenAIRequest {
            input: text,
            model: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| QaError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QaError::Embedding(format!(
                "OpenAI API error ({status}): {error_text}"
            )));
        }

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| QaError::Embedding(format!("Failed to parse response: {e}")))?;

        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| QaError::Embedding("No embedding in response".to_string()))
    }

    /// Generate embedding using Ollama API
    async fn generate_ollama(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.endpoint);
        debug!("Calling Ollama embeddings API: {}", url);

        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| QaError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QaError::Embedding(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| QaError::Embedding(format!("Failed to parse response: {e}")))?;

        Ok(result.embedding)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.generate(text).await
    }
}
