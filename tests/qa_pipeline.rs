//! End-to-end tests of the QA pipeline with in-memory doubles

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use memberqa::api::build_app;
use memberqa::config::ServerConfig;
use memberqa::embeddings::Embedder;
use memberqa::identity::KnownIdentityCache;
use memberqa::index::InMemoryIndex;
use memberqa::llm::GenerationService;
use memberqa::rag::QaOutcome;
use memberqa::rag::QaPrompts;
use memberqa::rag::QaService;
use memberqa::rag::SemanticRetriever;
use memberqa::rag::NO_CONTEXT_ANSWER;
use memberqa::resolve::CapitalizedSpanExtractor;
use memberqa::resolve::NameResolver;
use memberqa::QaError;
use memberqa::Result;
use tower::ServiceExt;

const DIMENSION: usize = 64;

/// Bag-of-words hashed into a fixed number of buckets
struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIMENSION];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = token
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3));
            vector[(hash % DIMENSION as u64) as usize] += 1.0;
        }
        Ok(vector)
    }
}

/// Records every prompt and answers with a fixed completion
struct RecordingGenerator {
    reply: String,
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingGenerator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn last_user_prompt(&self) -> String {
        self.calls().last().map(|(_, user)| user.clone()).unwrap()
    }
}

#[async_trait]
impl GenerationService for RecordingGenerator {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        Ok(self.reply.clone())
    }
}

struct FailingGenerator;

#[async_trait]
impl GenerationService for FailingGenerator {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        Err(QaError::GenerationService("503 from upstream".to_string()))
    }
}

const KNOWN_NAMES: &str = r#"{
    "Layla Kawaguchi": {},
    "Vikram Desai": {},
    "Vikram Singh": {},
    "Sophia Al-Farsi": {},
    "Hans Müller": {}
}"#;

const MESSAGES: &str = r#"[
    {"id": "l2", "member_name": "Layla Kawaguchi", "text": "I'm planning my trip to London next Friday", "timestamp": "2024-05-01T09:00:00Z"},
    {"id": "l3", "member_name": "Layla Kawaguchi", "text": "Please book a table at Nobu in London", "timestamp": "2024-05-03T18:30:00Z"},
    {"id": "l1", "member_name": "Layla Kawaguchi", "text": "I need a hotel in Tokyo", "timestamp": "2024-04-20T09:00:00Z"},
    {"id": "v1", "member_name": "Vikram Desai", "text": "I now own three cars after buying a Tesla", "timestamp": "2024-03-01T12:00:00Z"},
    {"id": "v2", "member_name": "Vikram Desai", "text": "Send my car to the garage on Monday", "timestamp": "2024-03-04T08:00:00Z"},
    {"id": "s1", "member_name": "Vikram Singh", "text": "I want to sell one of my cars", "timestamp": "2024-02-11T10:00:00Z"},
    {"id": "f1", "member_name": "Sophia Al-Farsi", "text": "Book me a trip to London too", "timestamp": "2024-05-02T07:15:00Z"}
]"#;

async fn service(generator: Arc<dyn GenerationService>) -> QaService {
    let cache = Arc::new(KnownIdentityCache::from_json_str(KNOWN_NAMES).unwrap());
    let embedder = Arc::new(HashEmbedder);
    let mut index = InMemoryIndex::from_json_str(MESSAGES).unwrap();
    index.embed_missing(embedder.as_ref()).await.unwrap();

    let resolver = NameResolver::new(
        cache,
        Arc::new(CapitalizedSpanExtractor::new()),
        Default::default(),
    );
    let retriever = SemanticRetriever::new(Arc::new(index), embedder).with_candidate_k(20);
    QaService::from_services(resolver, retriever, generator, QaPrompts::default()).with_top_k(5)
}

fn answer_text(outcome: QaOutcome) -> String {
    match outcome {
        QaOutcome::Answer { answer } => answer,
        QaOutcome::Clarification { candidates } => panic!("unexpected clarification {candidates:?}"),
    }
}

#[tokio::test]
async fn test_layla_trip_uses_only_her_messages_in_order() {
    let generator = RecordingGenerator::new("Reasoning: she said so.\nAnswer: Next Friday");
    let qa = service(generator.clone()).await;

    let outcome = qa
        .answer("When is Layla planning her trip to London?")
        .await
        .unwrap();
    assert_eq!(answer_text(outcome), "Next Friday");

    assert_eq!(generator.calls().len(), 1);
    let prompt = generator.last_user_prompt();
    assert!(prompt.contains("Member referenced in question: Layla Kawaguchi"));
    assert!(prompt.contains("Snippets retrieved: 3"));
    assert!(!prompt.contains("Sophia Al-Farsi:"));
    assert!(!prompt.contains("Vikram"));

    // Order is checked in the message block, below the summary lines
    let (_, messages) = prompt.split_once("Messages (grouped by member").unwrap();
    let tokyo = messages.find("hotel in Tokyo").unwrap();
    let trip = messages.find("trip to London next Friday").unwrap();
    let nobu = messages.find("table at Nobu").unwrap();
    assert!(tokyo < trip && trip < nobu);
    assert!(prompt.contains("Latest recorded activity: 2024-05-03 18:30:00 - Please book a table at Nobu in London"));
}

#[tokio::test]
async fn test_full_name_beats_shared_first_name() {
    let generator = RecordingGenerator::new("Answer: Three");
    let qa = service(generator.clone()).await;

    let outcome = qa.answer("How many cars does Vikram Desai have?").await.unwrap();
    assert_eq!(answer_text(outcome), "Three");

    let prompt = generator.last_user_prompt();
    assert!(prompt.contains("Vikram Desai: I now own three cars"));
    assert!(!prompt.contains("Vikram Singh"));
}

#[tokio::test]
async fn test_shared_first_name_asks_for_clarification() {
    let generator = RecordingGenerator::new("Answer: unused");
    let qa = service(generator.clone()).await;

    let outcome = qa.answer("What did Vikram say about his cars?").await.unwrap();
    assert_eq!(
        outcome,
        QaOutcome::Clarification {
            candidates: vec!["Vikram Desai".to_string(), "Vikram Singh".to_string()]
        }
    );
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn test_no_member_mentioned_searches_everyone() {
    let generator = RecordingGenerator::new("Answer: Layla and Sophia");
    let qa = service(generator.clone()).await;

    let outcome = qa.answer("Who is going to London?").await.unwrap();
    assert_eq!(answer_text(outcome), "Layla and Sophia");

    let prompt = generator.last_user_prompt();
    assert!(prompt.contains("Name not explicitly mentioned"));
    assert!(prompt.contains("Snippets retrieved: 5"));
}

#[tokio::test]
async fn test_multiple_members_keep_attribution() {
    let generator = RecordingGenerator::new("Answer: Both");
    let qa = service(generator.clone()).await;

    qa.answer("Are Layla and Sophia both going to London?")
        .await
        .unwrap();

    let prompt = generator.last_user_prompt();
    assert!(prompt.contains("Member referenced in question: Layla Kawaguchi, Sophia Al-Farsi"));
    let layla = prompt.find("## Layla Kawaguchi").unwrap();
    let sophia = prompt.find("## Sophia Al-Farsi").unwrap();
    assert!(layla < sophia);
    assert!(prompt.contains("Sophia Al-Farsi: Book me a trip to London too"));
}

#[tokio::test]
async fn test_member_without_messages_skips_generation() {
    let generator = RecordingGenerator::new("Answer: unused");
    let qa = service(generator.clone()).await;

    let outcome = qa.answer("What did Hans say last week?").await.unwrap();
    assert_eq!(answer_text(outcome), NO_CONTEXT_ANSWER);
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn test_blank_question_is_invalid() {
    let qa = service(RecordingGenerator::new("Answer: unused")).await;
    let err = qa.answer("  \n ").await.unwrap_err();
    assert!(matches!(err, QaError::InvalidQuestion(_)));
}

#[tokio::test]
async fn test_generation_failure_propagates() {
    let qa = service(Arc::new(FailingGenerator)).await;
    let err = qa
        .answer("When is Layla planning her trip to London?")
        .await
        .unwrap_err();
    assert!(matches!(err, QaError::GenerationService(_)));
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1_000_000)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn ask_request(question: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/ask")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "question": question }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_http_ask_and_health() {
    let generator = RecordingGenerator::new("Answer: Next Friday");
    let qa = Arc::new(service(generator).await);
    let app = build_app(qa, &ServerConfig::default());

    let response = app
        .clone()
        .oneshot(ask_request("When is Layla planning her trip to London?"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["answer"], "Next Friday");

    let response = app
        .clone()
        .oneshot(ask_request("What did Vikram say?"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["clarification_candidates"][1], "Vikram Singh");

    let response = app.clone().oneshot(ask_request("   ")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["known_members"], 5);
}

#[tokio::test]
async fn test_http_generation_failure_is_bad_gateway() {
    let qa = Arc::new(service(Arc::new(FailingGenerator)).await);
    let app = build_app(qa, &ServerConfig::default());

    let response = app
        .oneshot(ask_request("When is Layla planning her trip to London?"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
