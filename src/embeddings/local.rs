//! In-process embeddings via fastembed (ONNX runtime bundled)
//!
//! Only available with the `local-embeddings` feature. The model is loaded
//! once; inference runs on the blocking pool.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use super::check_dimension;
use super::Embedder;
use crate::config::EmbeddingsConfig;
use crate::errors::QaError;
use crate::errors::Result;

pub struct LocalEmbedder {
    model_name: String,
    dimension: usize,
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

impl LocalEmbedder {
    /// Load (downloading on first use) the configured model
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let model = to_fastembed_model(&config.model)?;
        info!("Loading local embedding model {}", config.model);
        let embedding = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model).with_show_download_progress(false),
        )
        .map_err(|e| QaError::Embedding(format!("Failed to initialize local embedding model: {e}")))?;

        Ok(Self {
            model_name: config.model.clone(),
            dimension: config.dimension,
            model: Arc::new(Mutex::new(embedding)),
        })
    }
}

fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    let short = name.rsplit('/').next().unwrap_or(name).to_lowercase();
    match short.as_str() {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => Err(QaError::Config(format!(
            "unsupported local embedding model '{other}'"
        ))),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let embedding = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| QaError::Embedding("local embedding model lock poisoned".to_string()))?;
            model
                .embed(vec![text], None)
                .map_err(|e| QaError::Embedding(format!("Local embedding failed: {e}")))?
                .into_iter()
                .next()
                .ok_or_else(|| QaError::Embedding("No embedding returned".to_string()))
        })
        .await
        .map_err(|e| QaError::Embedding(format!("embedding task failed: {e}")))??;

        check_dimension(&embedding, self.dimension)?;
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_mapping() {
        assert!(matches!(
            to_fastembed_model("BAAI/bge-small-en-v1.5"),
            Ok(fastembed::EmbeddingModel::BGESmallENV15)
        ));
        assert!(matches!(
            to_fastembed_model("sentence-transformers/all-MiniLM-L6-v2"),
            Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(to_fastembed_model("made-up").is_err());
    }
}
