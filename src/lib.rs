pub mod api;
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod identity;
pub mod index;
pub mod llm;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod rag;
pub mod resolve;

pub use config::AppConfig;
pub use errors::*;
