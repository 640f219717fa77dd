use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::errors::QaError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write a daily rolling log file under `logs/` in addition to stderr
    #[serde(default)]
    pub file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the known-identity cache file
    #[serde(default = "default_known_names_path")]
    pub path: PathBuf,
}

fn default_known_names_path() -> PathBuf {
    PathBuf::from("config/known_names.json")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_known_names_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/embeddings` endpoint
    OpenAI,
    /// Ollama `/api/embeddings` endpoint
    Ollama,
    /// In-process fastembed model (requires the `local-embeddings` feature)
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_backend")]
    pub provider: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Must match the dimensionality the vector index was built with
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Ollama
}

fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_embedding_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_service_timeout() -> u64 {
    30
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_backend(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            endpoint: default_embedding_endpoint(),
            api_key: None,
            timeout_secs: default_service_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Pinecone-compatible REST index
    Pinecone,
    /// Brute-force cosine index over a local message dump
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    #[serde(default = "default_index_backend")]
    pub provider: IndexBackend,
    /// Index host, e.g. `https://messages-abc123.svc.us-east-1.pinecone.io`
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Message dump loaded by the memory backend
    #[serde(default)]
    pub messages_path: Option<PathBuf>,
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

fn default_index_backend() -> IndexBackend {
    IndexBackend::Pinecone
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_backend(),
            host: None,
            api_key: None,
            namespace: None,
            messages_path: None,
            timeout_secs: default_service_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,
    #[serde(default)]
    pub llm_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_llm_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    256
}

fn default_top_p() -> f32 {
    0.9
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_endpoint: default_llm_endpoint(),
            llm_key: None,
            llm_model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            timeout_secs: default_service_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of messages handed to the context assembler
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum number of candidates requested from the index
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    /// Per-message snippet bound in characters
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_candidate_k() -> usize {
    20
}

fn default_snippet_max_chars() -> usize {
    500
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
            snippet_max_chars: default_snippet_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum similarity for a fuzzy span match
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    /// Lead the best fuzzy candidate needs over the runner-up to win outright
    #[serde(default = "default_fuzzy_margin")]
    pub fuzzy_margin: f64,
    /// Minimum similarity when scanning the whole question (no spans found)
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f64,
}

fn default_fuzzy_threshold() -> f64 {
    0.85
}

fn default_fuzzy_margin() -> f64 {
    0.05
}

fn default_fallback_threshold() -> f64 {
    0.93
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            fuzzy_margin: default_fuzzy_margin(),
            fallback_threshold: default_fallback_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_concurrent_requests() -> usize {
    32
}

fn default_request_timeout() -> u64 {
    60
}

fn default_enable_cors() -> bool {
    true
}

impl ServerConfig {
    /// Address the HTTP shell binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_secs: default_request_timeout(),
            enable_cors: default_enable_cors(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
    #[serde(default)]
    pub user_template_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let mut config: AppConfig = toml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default config file path
    pub fn load() -> crate::Result<Self> {
        // Try to load from config.toml first, then fall back to config.example.toml
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            tracing::warn!(
                "Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            Err(QaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config file found. Please create config.toml or config.example.toml",
            )))
        }
    }

    /// Fill secrets left out of the file from the environment.
    fn apply_env_overrides(&mut self) {
        if self.vector_index.api_key.is_none() {
            self.vector_index.api_key = std::env::var("PINECONE_API_KEY").ok();
        }
        if self.llm.llm_key.is_none() {
            self.llm.llm_key = std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("GROQ_API_KEY"))
                .ok();
        }
        if self.embeddings.api_key.is_none() {
            self.embeddings.api_key = std::env::var("EMBEDDING_API_KEY").ok();
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(QaError::Config("retrieval.top_k must be >= 1".into()));
        }
        if self.retrieval.snippet_max_chars == 0 {
            return Err(QaError::Config(
                "retrieval.snippet_max_chars must be >= 1".into(),
            ));
        }
        if self.embeddings.dimension == 0 {
            return Err(QaError::Config("embeddings.dimension must be > 0".into()));
        }
        for (name, value) in [
            ("resolver.fuzzy_threshold", self.resolver.fuzzy_threshold),
            ("resolver.fuzzy_margin", self.resolver.fuzzy_margin),
            ("resolver.fallback_threshold", self.resolver.fallback_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(QaError::Config(format!("{name} must be in [0.0, 1.0]")));
            }
        }
        if let Some(host) = &self.vector_index.host {
            // Bare hosts get https:// added by the index client
            let with_scheme = if host.contains("://") {
                host.clone()
            } else {
                format!("https://{host}")
            };
            url::Url::parse(&with_scheme).map_err(|e| {
                QaError::Config(format!("vector_index.host is not a valid URL: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.candidate_k, 20);
        assert_eq!(config.embeddings.dimension, 384);
        assert_eq!(config.embeddings.model, "BAAI/bge-small-en-v1.5");
        assert_eq!(config.llm.llm_model, "llama-3.3-70b-versatile");
        assert_eq!(config.cache.path, PathBuf::from("config/known_names.json"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = AppConfig::from_toml_str(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.vector_index.provider, IndexBackend::Pinecone);
        assert_eq!(config.vector_index.namespace.as_deref(), Some("messages"));
        assert_eq!(config.server.bind_address(), "127.0.0.1:8000");
    }

    #[test]
    fn test_bare_index_host_is_accepted() {
        let config =
            AppConfig::from_toml_str("[vector_index]\nhost = \"idx.svc.pinecone.io\"\n").unwrap();
        assert_eq!(config.vector_index.host.as_deref(), Some("idx.svc.pinecone.io"));
    }

    #[test]
    fn test_sections_parse() {
        let config = AppConfig::from_toml_str(
            r#"
            [retrieval]
            top_k = 8
            snippet_max_chars = 200

            [vector_index]
            provider = "memory"
            messages_path = "data/messages.json"

            [embeddings]
            provider = "openai"
            model = "text-embedding-3-small"
            dimension = 384

            [resolver]
            fuzzy_threshold = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.snippet_max_chars, 200);
        assert_eq!(config.vector_index.provider, IndexBackend::Memory);
        assert_eq!(config.embeddings.provider, EmbeddingBackend::OpenAI);
        assert!((config.resolver.fuzzy_threshold - 0.9).abs() < f64::EPSILON);
        assert!((config.resolver.fuzzy_margin - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let err = AppConfig::from_toml_str("[retrieval]\ntop_k = 0\n").unwrap_err();
        assert!(matches!(err, QaError::Config(_)));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let err = AppConfig::from_toml_str("[resolver]\nfuzzy_threshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("fuzzy_threshold"));
    }

    #[test]
    fn test_rejects_bad_index_host() {
        let err =
            AppConfig::from_toml_str("[vector_index]\nhost = \"not a url\"\n").unwrap_err();
        assert!(matches!(err, QaError::Config(_)));
    }

    #[test]
    fn test_unknown_provider_is_parse_error() {
        let err =
            AppConfig::from_toml_str("[vector_index]\nprovider = \"faiss\"\n").unwrap_err();
        assert!(matches!(err, QaError::TomlParsing(_)));
    }
}
