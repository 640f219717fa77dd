use thiserror::Error;

#[derive(Error, Debug)]
pub enum QaError {
    /// The Known-Identity Cache could not be read or parsed. Fatal at startup.
    #[error("Known-identity cache load error: {0}")]
    CacheLoad(String),

    /// The vector index was unreachable or answered with something unusable.
    #[error("Retrieval service error: {0}")]
    RetrievalService(String),

    /// The text-completion backend failed.
    #[error("Generation service error: {0}")]
    GenerationService(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QaError {
    /// True for failures of a downstream network service.
    #[must_use]
    pub const fn is_service_failure(&self) -> bool {
        matches!(
            self,
            Self::RetrievalService(_) | Self::GenerationService(_) | Self::Embedding(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, QaError>;
