//! Vector index access
//!
//! The index stores one vector per member message, with `member_name`,
//! `text` and `timestamp` metadata. Similarity is cosine. Two backends:
//! - [`PineconeIndex`]: Pinecone-compatible REST data plane
//! - [`InMemoryIndex`]: brute-force search over a JSON message dump

pub mod memory;
pub mod pinecone;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde_json::Map;
use serde_json::Value;

pub use memory::InMemoryIndex;
pub use pinecone::PineconeIndex;

use crate::config::IndexBackend;
use crate::config::VectorIndexConfig;
use crate::embeddings::Embedder;
use crate::errors::QaError;
use crate::errors::Result;
use crate::models::parse_timestamp;
use crate::models::timestamp_from_unix_seconds;

/// Metadata key holding the author of a message
pub const MEMBER_FIELD: &str = "member_name";

/// Equality filter on one metadata field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub field: String,
    pub value: String,
}

impl MetadataFilter {
    /// Restrict results to messages authored by `canonical_name`
    pub fn member(canonical_name: &str) -> Self {
        Self {
            field: MEMBER_FIELD.to_string(),
            value: canonical_name.to_string(),
        }
    }

    /// Pinecone filter expression: `{"member_name": {"$eq": "..."}}`
    pub fn to_pinecone(&self) -> Value {
        let mut clause = Map::new();
        clause.insert(
            self.field.clone(),
            serde_json::json!({ "$eq": self.value }),
        );
        Value::Object(clause)
    }

    /// True if `metadata` satisfies this filter
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        metadata
            .get(&self.field)
            .and_then(Value::as_str)
            .is_some_and(|value| value == self.value)
    }
}

/// One scored hit from the index
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

impl IndexMatch {
    /// Message author (`member_name`, or `user_name` in older dumps)
    pub fn member_name(&self) -> Option<&str> {
        self.metadata
            .get(MEMBER_FIELD)
            .or_else(|| self.metadata.get("user_name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Message body (`text`, or `message`)
    pub fn text(&self) -> Option<&str> {
        self.metadata
            .get("text")
            .or_else(|| self.metadata.get("message"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Timestamp stored either as a string or as unix seconds
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.metadata.get("timestamp")? {
            Value::String(raw) => parse_timestamp(raw),
            Value::Number(number) => number.as_f64().and_then(timestamp_from_unix_seconds),
            _ => None,
        }
    }
}

/// Read-only similarity search over member messages
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &str;

    /// Up to `top_k` matches ordered by descending score.
    ///
    /// Transport and response failures are `QaError::RetrievalService`.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>>;
}

/// Build the index selected by configuration.
///
/// The memory backend embeds messages that were dumped without vectors.
pub async fn create_index(
    config: &VectorIndexConfig,
    embedder: &dyn Embedder,
) -> Result<Arc<dyn VectorIndex>> {
    match config.provider {
        IndexBackend::Pinecone => Ok(Arc::new(PineconeIndex::from_config(config)?)),
        IndexBackend::Memory => {
            let path = config.messages_path.as_ref().ok_or_else(|| {
                QaError::Config(
                    "vector_index.messages_path is required for the memory backend".to_string(),
                )
            })?;
            let mut index = InMemoryIndex::load(path)?;
            index.embed_missing(embedder).await?;
            Ok(Arc::new(index))
        }
    }
}
