//! Question answering pipeline: Resolve -> Retrieve -> Assemble -> Generate

use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use super::context::ContextAssembler;
use super::prompts::extract_final_answer;
use super::prompts::QaPrompts;
use super::retriever::SemanticRetriever;
use crate::config::AppConfig;
use crate::embeddings::create_embedder;
use crate::errors::QaError;
use crate::errors::Result;
use crate::identity::KnownIdentityCache;
use crate::index::create_index;
use crate::llm::GenerationService;
use crate::llm::LlmService;
use crate::models::RetrievedContextItem;
use crate::normalize::normalize_question;
use crate::resolve::CapitalizedSpanExtractor;
use crate::resolve::NameResolver;
use crate::resolve::Resolution;

/// Returned without calling the generator when nothing relevant was retrieved
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any messages that answer this question.";

/// Result of one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QaOutcome {
    Answer {
        answer: String,
    },
    /// The question names someone several members could be
    Clarification {
        #[serde(rename = "clarification_candidates")]
        candidates: Vec<String>,
    },
}

/// Complete QA service
pub struct QaService {
    resolver: NameResolver,
    retriever: SemanticRetriever,
    context_assembler: ContextAssembler,
    generator: Arc<dyn GenerationService>,
    prompts: QaPrompts,
    top_k: usize,
}

impl QaService {
    /// Build every component from configuration
    ///
    /// # Errors
    /// - Known-identity cache missing or malformed (`CacheLoad`)
    /// - Embedding, index or LLM configuration errors (missing keys, hosts)
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let cache = Arc::new(KnownIdentityCache::load(&config.cache.path)?);
        let embedder = create_embedder(&config.embeddings)?;
        let index = create_index(&config.vector_index, embedder.as_ref()).await?;
        let generator: Arc<dyn GenerationService> = Arc::new(LlmService::new(&config.llm)?);

        let resolver = NameResolver::new(
            cache,
            Arc::new(CapitalizedSpanExtractor::new()),
            config.resolver,
        );
        let retriever =
            SemanticRetriever::new(index, embedder).with_candidate_k(config.retrieval.candidate_k);

        Ok(Self::from_services(
            resolver,
            retriever,
            generator,
            QaPrompts::load(&config.prompts),
        )
        .with_top_k(config.retrieval.top_k)
        .with_snippet_max_chars(config.retrieval.snippet_max_chars))
    }

    /// Create from existing services
    #[must_use]
    pub fn from_services(
        resolver: NameResolver,
        retriever: SemanticRetriever,
        generator: Arc<dyn GenerationService>,
        prompts: QaPrompts,
    ) -> Self {
        Self {
            resolver,
            retriever,
            context_assembler: ContextAssembler::default(),
            generator,
            prompts,
            top_k: 5,
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_snippet_max_chars(mut self, snippet_max_chars: usize) -> Self {
        self.context_assembler = ContextAssembler::new(snippet_max_chars);
        self
    }

    /// Answer a question about members, or ask which member was meant.
    ///
    /// # Errors
    /// - Blank question (`InvalidQuestion`)
    /// - Embedding or vector index failures (`Embedding`, `RetrievalService`)
    /// - Generation failures (`GenerationService`)
    pub async fn answer(&self, question: &str) -> Result<QaOutcome> {
        let question = normalize_question(question);
        if question.is_empty() {
            return Err(QaError::InvalidQuestion("question is empty".to_string()));
        }
        info!("Processing question: {}", question);
        let started = Instant::now();

        // Step 1: Resolve members
        debug!("Step 1: Resolving members");
        let resolution = self.resolver.resolve(&question);
        info!("Resolution: {:?}", resolution);
        if let Resolution::Ambiguous(candidates) = resolution {
            return Ok(QaOutcome::Clarification { candidates });
        }

        // Step 2: Retrieve messages
        debug!("Step 2: Retrieving messages");
        let items = self.retrieve_for(&question, &resolution).await?;
        debug!("Retrieved {} messages", items.len());

        // Step 3: Assemble context
        debug!("Step 3: Assembling context");
        let context = self.context_assembler.assemble(&items);
        if context.is_empty() {
            info!("No context retrieved; skipping generation");
            return Ok(QaOutcome::Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
            });
        }

        // Step 4: Generate answer
        debug!("Step 4: Generating answer");
        let user_prompt = self
            .prompts
            .render_user(&question, &resolution.members(), &context);
        debug!("User prompt:\n{}", user_prompt);
        let raw = self
            .generator
            .complete(&self.prompts.system, &user_prompt)
            .await?;
        let answer = extract_final_answer(&raw);

        info!("Question answered in {:?}", started.elapsed());
        debug!("Raw answer: {}", raw);
        Ok(QaOutcome::Answer { answer })
    }

    /// One filtered search per resolved member, or one unfiltered search
    async fn retrieve_for(
        &self,
        question: &str,
        resolution: &Resolution,
    ) -> Result<Vec<RetrievedContextItem>> {
        match resolution {
            Resolution::Resolved(name) => {
                self.retriever
                    .retrieve(question, Some(name.as_str()), self.top_k)
                    .await
            }
            Resolution::Multiple(names) => {
                let per_member = try_join_all(names.iter().map(|name| {
                    self.retriever
                        .retrieve(question, Some(name.as_str()), self.top_k)
                }))
                .await?;
                Ok(per_member.into_iter().flatten().collect())
            }
            Resolution::Unresolved | Resolution::Ambiguous(_) => {
                self.retriever.retrieve(question, None, self.top_k).await
            }
        }
    }

    /// Get resolver reference
    #[must_use]
    pub const fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    #[must_use]
    pub const fn top_k(&self) -> usize {
        self.top_k
    }
}
