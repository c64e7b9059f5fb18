//! Integration tests for the draft-review WebSocket + REST surface.
//!
//! Each test spins up an Axum server on a random port, connects via
//! tokio-tungstenite, and exercises the real WS / REST contract with
//! stub classification, retrieval, and drafting collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use async_trait::async_trait;

use mail_triage::classify::Classifier;
use mail_triage::config::TriageConfig;
use mail_triage::drafts::{DraftStrategy, DraftWriter};
use mail_triage::error::{PipelineError, RetrievalError};
use mail_triage::model::{ClassificationResult, InboundMessage, RetrievalHit};
use mail_triage::pipeline::DraftPipeline;
use mail_triage::retrieval::{RankedDoc, Reranker, RetrievalFanout, SearchChunk, VectorSearch};
use mail_triage::review::ReviewCoordinator;
use mail_triage::review::registry::ReviewRegistry;
use mail_triage::server::app_routes;
use mail_triage::store::{LibSqlStore, OutcomeStore, TemplateStore};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stub classifier: no matched categories, no docs query. This forces the
/// dual-draft review path; tests that need the single-draft path use
/// `classified_server()` instead.
struct StubClassifier {
    categories: Vec<String>,
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(
        &self,
        message: &InboundMessage,
    ) -> Result<ClassificationResult, PipelineError> {
        Ok(ClassificationResult {
            categories: self.categories.clone(),
            new_categories: vec![],
            search_query: None,
            from: message.sender.clone(),
            subject: message.subject.clone(),
            body: message.body.clone(),
        })
    }
}

/// Stub search: a fixed number of high-relevance hits per index.
struct StubSearch {
    hits: usize,
}

#[async_trait]
impl VectorSearch for StubSearch {
    async fn search(
        &self,
        _query: &str,
        _index: &str,
        _top_k: usize,
        _categories: Option<&[String]>,
    ) -> Result<Vec<SearchChunk>, RetrievalError> {
        Ok((0..self.hits)
            .map(|i| SearchChunk {
                content: format!("ticket {i}"),
                score: 0.9,
                metadata: serde_json::Value::Null,
            })
            .collect())
    }
}

struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RankedDoc>, RetrievalError> {
        Ok((0..documents.len().min(top_n))
            .map(|index| RankedDoc {
                index,
                relevance_score: 0.8,
            })
            .collect())
    }
}

/// Stub writer: "Draft A" for the first call of a request, "Draft B" next.
struct StubWriter {
    calls: AtomicUsize,
}

#[async_trait]
impl DraftWriter for StubWriter {
    async fn write_draft(
        &self,
        _c: &ClassificationResult,
        _d: &[RetrievalHit],
        _s: &[RetrievalHit],
        _a: &[String],
    ) -> Result<String, PipelineError> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => Ok("Draft A".to_string()),
            _ => Ok("Draft B".to_string()),
        }
    }
}

/// Start an Axum server on a random port with stubbed collaborators.
///
/// Review budgets are short so unattended-review tests finish quickly.
async fn start_server_with(categories: Vec<String>, dataset_hits: usize) -> u16 {
    let config = TriageConfig {
        review_timeout: Duration::from_secs(5),
        connect_wait: Duration::from_millis(300),
        connect_poll_interval: Duration::from_millis(25),
        ..TriageConfig::default()
    };

    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let retrieval = Arc::new(RetrievalFanout::new(
        Arc::new(StubSearch { hits: dataset_hits }),
        Arc::new(PassthroughReranker),
        &TriageConfig {
            rerank_top_n: 20,
            ..config.clone()
        },
    ));
    let strategy = Arc::new(DraftStrategy::new(
        Arc::new(StubWriter {
            calls: AtomicUsize::new(0),
        }),
        config.single_draft_min_hits,
    ));
    let registry = ReviewRegistry::new(config.connect_poll_interval);
    let coordinator = Arc::new(ReviewCoordinator::new(registry, config.connect_wait));
    let pipeline = Arc::new(DraftPipeline::new(
        Arc::new(StubClassifier { categories }),
        retrieval,
        strategy,
        Arc::clone(&coordinator),
        store.clone() as Arc<dyn TemplateStore>,
        store as Arc<dyn OutcomeStore>,
        config,
    ));

    let app = app_routes(pipeline, coordinator);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    port
}

/// Server whose classifier finds no categories: every request needs review.
async fn start_server() -> u16 {
    start_server_with(vec![], 0).await
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

fn generate_body() -> Value {
    serde_json::json!({
        "sender": "alice@example.com",
        "subject": "Refund request",
        "body": "I was double charged last month.",
        "user_id": "reviewer_1"
    })
}

/// POST /api/drafts/generate and return the parsed reply.
async fn post_generate(port: u16) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/drafts/generate"))
        .json(&generate_body())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

// ── WebSocket Tests ──────────────────────────────────────────────────

#[tokio::test]
async fn ws_connect_receives_connection_test() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server().await;

        let (mut ws, _resp) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/drafts?user_id=reviewer_1"))
                .await
                .expect("WS connect failed");

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "connection_test");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_ping_gets_pong() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server().await;

        let (mut ws, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/drafts?user_id=reviewer_1"))
                .await
                .unwrap();
        let _ = ws.next().await.unwrap().unwrap(); // connection_test

        ws.send(Message::Text(r#"{"type": "ping"}"#.into()))
            .await
            .unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "pong");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_unknown_message_gets_error_reply_and_connection_survives() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server().await;

        let (mut ws, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/drafts?user_id=reviewer_1"))
                .await
                .unwrap();
        let _ = ws.next().await.unwrap().unwrap(); // connection_test

        ws.send(Message::Text(r#"{"type": "launch_missiles"}"#.into()))
            .await
            .unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "error");

        // The connection is still usable afterwards.
        ws.send(Message::Text(r#"{"type": "ping"}"#.into()))
            .await
            .unwrap();
        let msg = ws.next().await.unwrap().unwrap();
        assert_eq!(parse_ws_json(&msg)["type"], "pong");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_status_reports_no_pending_reviews() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server().await;

        let (mut ws, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/drafts?user_id=reviewer_1"))
                .await
                .unwrap();
        let _ = ws.next().await.unwrap().unwrap(); // connection_test

        ws.send(Message::Text(r#"{"type": "status"}"#.into()))
            .await
            .unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "status_response");
        assert_eq!(json["data"]["user_id"], "reviewer_1");
        assert_eq!(json["data"]["connected"], true);
        assert_eq!(json["data"]["pending_reviews"], 0);
    })
    .await
    .expect("test timed out");
}

// ── End-to-End Draft Flow ────────────────────────────────────────────

#[tokio::test]
async fn reviewed_draft_returns_reviewer_body() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server().await;

        let (mut ws, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/drafts?user_id=reviewer_1"))
                .await
                .unwrap();
        let _ = ws.next().await.unwrap().unwrap(); // connection_test

        // Kick off generation; it blocks on the review, so drive it in a task.
        let request = tokio::spawn(async move { post_generate(port).await });

        // The review lands on the socket with both drafts.
        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "draft_review");
        let drafts = json["data"]["drafts"].as_array().unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0], "Draft A");
        assert_eq!(drafts[1], "Draft B");

        // Answer with an edited body.
        ws.send(Message::Text(
            r#"{"type": "draft_response", "data": {"body": "Hi Alice, refund issued."}}"#.into(),
        ))
        .await
        .unwrap();

        let reply = request.await.unwrap();
        assert_eq!(reply["body"], "Hi Alice, refund issued.");
        assert_eq!(reply["is_skip"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn skip_response_returns_first_draft_flagged() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server().await;

        let (mut ws, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/drafts?user_id=reviewer_1"))
                .await
                .unwrap();
        let _ = ws.next().await.unwrap().unwrap(); // connection_test

        let request = tokio::spawn(async move { post_generate(port).await });

        let msg = ws.next().await.unwrap().unwrap();
        assert_eq!(parse_ws_json(&msg)["type"], "draft_review");

        ws.send(Message::Text(
            r#"{"type": "draft_response", "data": {"is_skip": true}}"#.into(),
        ))
        .await
        .unwrap();

        let reply = request.await.unwrap();
        assert_eq!(reply["body"], "Draft A");
        assert_eq!(reply["is_skip"], true);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn no_reviewer_connected_falls_back_to_first_draft() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server().await;

        // No WS client at all; the short connect wait expires and the
        // request still succeeds with the first draft.
        let reply = post_generate(port).await;
        assert_eq!(reply["body"], "Draft A");
        assert_eq!(reply["is_skip"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn grounded_request_skips_review_entirely() {
    timeout(TEST_TIMEOUT, async {
        // Categories matched and plenty of dataset hits: single-draft path.
        let port = start_server_with(vec!["billing".into()], 6).await;

        let (mut ws, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/drafts?user_id=reviewer_1"))
                .await
                .unwrap();
        let _ = ws.next().await.unwrap().unwrap(); // connection_test

        let reply = post_generate(port).await;
        assert_eq!(reply["body"], "Draft A");
        assert_eq!(reply["is_skip"], false);

        // Nothing was published to the reviewer; status shows no pending.
        ws.send(Message::Text(r#"{"type": "status"}"#.into()))
            .await
            .unwrap();
        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "status_response");
        assert_eq!(json["data"]["pending_reviews"], 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn reconnect_replaces_channel_and_serves_new_socket() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server().await;

        let (mut ws1, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/drafts?user_id=reviewer_1"))
                .await
                .unwrap();
        let _ = ws1.next().await.unwrap().unwrap(); // connection_test

        // Second connection for the same party replaces the first.
        let (mut ws2, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/drafts?user_id=reviewer_1"))
                .await
                .unwrap();
        let _ = ws2.next().await.unwrap().unwrap(); // connection_test

        let request = tokio::spawn(async move { post_generate(port).await });

        // The review goes to the new socket.
        let msg = ws2.next().await.unwrap().unwrap();
        assert_eq!(parse_ws_json(&msg)["type"], "draft_review");

        ws2.send(Message::Text(
            r#"{"type": "draft_response", "data": {"body": "From the new socket"}}"#.into(),
        ))
        .await
        .unwrap();

        let reply = request.await.unwrap();
        assert_eq!(reply["body"], "From the new socket");

        // The replaced socket winds down rather than receiving the review.
        match timeout(Duration::from_secs(2), ws1.next()).await {
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) => {}
            Ok(Some(Ok(other))) => panic!("old socket unexpectedly received {:?}", other),
            Err(_) => panic!("old socket was not closed"),
        }
    })
    .await
    .expect("test timed out");
}

// ── REST Endpoint Tests ──────────────────────────────────────────────

#[tokio::test]
async fn rest_health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server().await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "mail-triage");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_logs_returns_recorded_outcomes() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server_with(vec!["billing".into()], 6).await;

        // Empty before any request.
        let resp = reqwest::get(format!("http://127.0.0.1:{port}/api/logs"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Vec<Value> = resp.json().await.unwrap();
        assert!(body.is_empty());

        let _ = post_generate(port).await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/api/logs?limit=10"))
            .await
            .unwrap();
        let body: Vec<Value> = resp.json().await.unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0]["from"], "alice@example.com");
        assert_eq!(body[0]["subject"], "Refund request");
        assert_eq!(body[0]["draft_response"], "Draft A");
        assert_eq!(body[0]["multiple_drafts_generated"], false);
        assert_eq!(body[0]["user_reviewed"], false);
    })
    .await
    .expect("test timed out");
}
