//! Question embedding
//!
//! The retriever embeds each question with the same model the message index
//! was built with. Providers:
//! - OpenAI-compatible `/embeddings` endpoints
//! - Ollama (local server)
//! - fastembed in-process (`local-embeddings` feature)

pub mod client;
#[cfg(feature = "local-embeddings")]
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

pub use client::EmbeddingClient;
pub use client::EmbeddingProvider;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

use crate::config::EmbeddingBackend;
use crate::config::EmbeddingsConfig;
use crate::errors::QaError;
use crate::errors::Result;

/// Anything that turns a text into a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// Dimensionality every returned vector must have
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Reject vectors whose length disagrees with the configured dimension.
pub fn check_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(QaError::Embedding(format!(
            "embedding has {} dimensions, index expects {}",
            vector.len(),
            expected
        )));
    }
    Ok(())
}

/// Build the embedder selected by configuration
pub fn create_embedder(config: &EmbeddingsConfig) -> Result<Arc<dyn Embedder>> {
    info!(
        "Embedding provider: {:?}, model: {}, dimension: {}",
        config.provider, config.model, config.dimension
    );
    match config.provider {
        EmbeddingBackend::OpenAI => Ok(Arc::new(EmbeddingClient::from_config(
            EmbeddingProvider::OpenAI,
            config,
        )?)),
        EmbeddingBackend::Ollama => Ok(Arc::new(EmbeddingClient::from_config(
            EmbeddingProvider::Ollama,
            config,
        )?)),
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::Local => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingBackend::Local => Err(QaError::Config(
            "embeddings.provider = \"local\" requires building with --features local-embeddings"
                .to_string(),
        )),
    }
}
