//! Retrieval-augmented answering over member messages
//!
//! - Semantic retrieval, optionally restricted to one member
//! - Context assembly grouped per member in chronological order
//! - Prompting and answer extraction
//!
//! # Examples
//!
//! ```rust,no_run
//! use memberqa::config::AppConfig;
//! use memberqa::rag::QaOutcome;
//! use memberqa::rag::QaService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let service = QaService::new(&config).await?;
//!
//!     match service.answer("When is Layla planning her trip to London?").await? {
//!         QaOutcome::Answer { answer } => println!("{answer}"),
//!         QaOutcome::Clarification { candidates } => println!("Which one? {candidates:?}"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod pipeline;
pub mod prompts;
pub mod retriever;

pub use context::AssembledContext;
pub use context::ContextAssembler;
pub use context::MemberGroup;
pub use pipeline::QaOutcome;
pub use pipeline::QaService;
pub use pipeline::NO_CONTEXT_ANSWER;
pub use prompts::QaPrompts;
pub use retriever::SemanticRetriever;
