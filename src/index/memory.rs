//! In-memory vector index over a JSON message dump
//!
//! Brute-force cosine search. Suited to local runs and tests; the dump is
//! loaded once and never mutated while serving.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::IndexMatch;
use super::MetadataFilter;
use super::VectorIndex;
use super::MEMBER_FIELD;
use crate::embeddings::Embedder;
use crate::errors::QaError;
use crate::errors::Result;
use crate::models::parse_timestamp;
use crate::models::timestamp_from_unix_seconds;
use crate::models::Message;
use crate::normalize::canonical_form;

/// Lenient record layout accepted in dump files
#[derive(Debug, Deserialize)]
struct DumpRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "user_name")]
    member_name: Option<String>,
    #[serde(default, alias = "message")]
    text: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Dump {
    List(Vec<DumpRecord>),
    Wrapped { items: Vec<DumpRecord> },
}

#[derive(Debug, Default)]
pub struct InMemoryIndex {
    messages: Vec<Message>,
}

impl InMemoryIndex {
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Load a message dump (`[{..}]` or `{"items": [..]}`)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let index = Self::from_json_str(&content)?;
        info!(
            "Loaded {} messages into the in-memory index from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let records = match serde_json::from_str::<Dump>(content)? {
            Dump::List(items) | Dump::Wrapped { items } => items,
        };

        let mut messages = Vec::with_capacity(records.len());
        for (position, record) in records.into_iter().enumerate() {
            let (Some(member_name), Some(text)) = (record.member_name, record.text) else {
                debug!("Skipping dump record {} without author or text", position);
                continue;
            };
            let timestamp = match record.timestamp {
                Some(Value::String(raw)) => parse_timestamp(&raw),
                Some(Value::Number(n)) => n.as_f64().and_then(timestamp_from_unix_seconds),
                _ => None,
            };
            messages.push(Message {
                id: record.id.unwrap_or_else(|| format!("msg-{position}")),
                member_name: canonical_form(&member_name),
                timestamp,
                text,
                embedding: record.embedding,
            });
        }
        Ok(Self::from_messages(messages))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Embed every message that was dumped without a vector
    pub async fn embed_missing(&mut self, embedder: &dyn Embedder) -> Result<usize> {
        let mut embedded = 0;
        for message in self.messages.iter_mut().filter(|m| m.embedding.is_empty()) {
            message.embedding = embedder.embed(&message.text).await?;
            embedded += 1;
        }
        if embedded > 0 {
            info!("Embedded {} messages with {}", embedded, embedder.model_name());
        }
        Ok(embedded)
    }

    fn metadata(message: &Message) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert(
            MEMBER_FIELD.to_string(),
            Value::String(message.member_name.clone()),
        );
        metadata.insert("text".to_string(), Value::String(message.text.clone()));
        if let Some(ts) = message.timestamp {
            metadata.insert("timestamp".to_string(), Value::String(ts.to_rfc3339()));
        }
        metadata
    }
}

/// Cosine similarity; `0.0` for empty or mismatched vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>> {
        if vector.is_empty() {
            return Err(QaError::RetrievalService("empty query vector".to_string()));
        }

        let mut scored: Vec<IndexMatch> = Vec::new();
        let mut skipped = 0usize;
        for message in &self.messages {
            if message.embedding.len() != vector.len() {
                skipped += 1;
                continue;
            }
            let metadata = Self::metadata(message);
            if filter.is_some_and(|f| !f.matches(&metadata)) {
                continue;
            }
            scored.push(IndexMatch {
                id: message.id.clone(),
                score: cosine_similarity(vector, &message.embedding),
                metadata,
            });
        }
        if skipped > 0 {
            warn!("{} messages skipped: vector dimension differs from the query", skipped);
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, member: &str, embedding: Vec<f32>) -> Message {
        Message {
            id: id.to_string(),
            member_name: member.to_string(),
            timestamp: None,
            text: format!("text of {id}"),
            embedding,
        }
    }

    fn index() -> InMemoryIndex {
        InMemoryIndex::from_messages(vec![
            message("a", "Layla Kawaguchi", vec![1.0, 0.0]),
            message("b", "Vikram Desai", vec![0.9, 0.1]),
            message("c", "Layla Kawaguchi", vec![0.0, 1.0]),
            message("d", "Vikram Singh", vec![1.0, 0.0, 0.0]),
        ])
    }

    #[test]
    fn test_cosine() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_unfiltered_query_orders_by_score() {
        let hits = index().query(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_filter_restricts_member() {
        let filter = MetadataFilter::member("Layla Kawaguchi");
        let hits = index().query(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.member_name() == Some("Layla Kawaguchi")));
    }

    #[tokio::test]
    async fn test_top_k_bounds_results() {
        let hits = index().query(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn test_lenient_dump() {
        let index = InMemoryIndex::from_json_str(
            r#"{"items": [
                {"id": "1", "user_name": "Layla  Kawaguchi", "message": "hi", "timestamp": "2024-05-01T10:00:00Z"},
                {"member_name": "Vikram Desai", "text": "yo", "timestamp": 1714557600},
                {"member_name": "No Text"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.messages[0].member_name, "Layla Kawaguchi");
        assert_eq!(index.messages[1].id, "msg-1");
        assert!(index.messages[1].timestamp.is_some());
    }
}
