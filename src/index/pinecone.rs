//! Pinecone-compatible data plane client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use super::IndexMatch;
use super::MetadataFilter;
use super::VectorIndex;
use crate::config::VectorIndexConfig;
use crate::errors::QaError;
use crate::errors::Result;

pub struct PineconeIndex {
    host: String,
    api_key: String,
    namespace: Option<String>,
    client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl PineconeIndex {
    pub fn new(
        host: &str,
        api_key: String,
        namespace: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| QaError::RetrievalService(e.to_string()))?;

        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };

        Ok(Self {
            host,
            api_key,
            namespace: namespace.filter(|ns| !ns.is_empty()),
            client,
        })
    }

    pub fn from_config(config: &VectorIndexConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| QaError::Config("vector_index.host is required".to_string()))?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            QaError::Config("vector_index.api_key (or PINECONE_API_KEY) is required".to_string())
        })?;
        Self::new(host, api_key, config.namespace.clone(), config.timeout_secs)
    }

    fn request_body<'a>(
        &'a self,
        vector: &'a [f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> QueryRequest<'a> {
        QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            filter: filter.map(MetadataFilter::to_pinecone),
            namespace: self.namespace.as_deref(),
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>> {
        let url = format!("{}/query", self.host);
        debug!("Querying Pinecone: {} (top_k={}, filter={:?})", url, top_k, filter);

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&self.request_body(vector, top_k, filter))
            .send()
            .await
            .map_err(|e| QaError::RetrievalService(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QaError::RetrievalService(format!(
                "Pinecone query failed ({status}): {error_text}"
            )));
        }

        let result: QueryResponse = response.json().await.map_err(|e| {
            QaError::RetrievalService(format!("Failed to parse query response: {e}"))
        })?;

        let mut matches: Vec<IndexMatch> = result
            .matches
            .into_iter()
            .map(|m| IndexMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}
