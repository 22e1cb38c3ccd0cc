//! End-to-end tests for the session routes, run in-process against the
//! in-memory store and a fake generative backend.

use api_lib::web::{rest::BACKEND_APOLOGY, router, AppState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use documind_core::{
    ChatMessage, ConversationOrchestrator, Document, DocumentBody, DocumentNormalizer,
    GenerateRequest, GenerateResponse, GenerativeBackend, InMemorySessionStore, InlineMedia,
    ModelCatalog, PortError, PortResult, Session, SessionStore, UserId,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tower::util::ServiceExt;

//=========================================================================================
// Harness
//=========================================================================================

/// Answers every request; with `gated` set, each call waits for `gate` first.
#[derive(Default)]
struct FakeBackend {
    fail: AtomicBool,
    gated: AtomicBool,
    gate: Notify,
    requests: Mutex<Vec<GenerateRequest>>,
}

#[async_trait]
impl GenerativeBackend for FakeBackend {
    async fn generate(&self, request: GenerateRequest) -> PortResult<GenerateResponse> {
        self.requests.lock().unwrap().push(request);
        if self.gated.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("connection reset".into()));
        }
        Ok(GenerateResponse {
            text: Some("It shows steady growth.".into()),
        })
    }
}

struct TestApp {
    router: Router,
    store: Arc<InMemorySessionStore>,
    backend: Arc<FakeBackend>,
    state: Arc<AppState>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_normalizer(DocumentNormalizer::new())
    }

    fn with_normalizer(normalizer: DocumentNormalizer) -> Self {
        let store = Arc::new(InMemorySessionStore::new());
        let backend = Arc::new(FakeBackend::default());
        let orchestrator = ConversationOrchestrator::new(backend.clone(), ModelCatalog::default());
        let state = Arc::new(AppState::new(store.clone(), orchestrator, normalizer));
        Self {
            router: router(state.clone()),
            store,
            backend,
            state,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Starts a question against a gated backend and returns once the backend holds it.
    async fn ask_in_flight(&self, question: &str) -> tokio::task::JoinHandle<Response> {
        self.backend.gated.store(true, Ordering::SeqCst);
        let router = self.router.clone();
        let request = ask(json!({ "question": question }));
        let pending = tokio::spawn(async move { router.oneshot(request).await.unwrap() });
        for _ in 0..200 {
            if !self.backend.requests.lock().unwrap().is_empty() {
                return pending;
            }
            tokio::task::yield_now().await;
        }
        panic!("question never reached the backend");
    }

    async fn get_session(&self) -> Value {
        let response = self.send(empty("GET", "/session")).await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    async fn upload_image(&self) {
        let response = self
            .send(upload("chart.png", "image/png", b"\x89PNG fake image"))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    /// Waits for the background autosave to make the stored session satisfy `check`.
    async fn stored_when(&self, check: impl Fn(Option<&Session>) -> bool) -> Option<Session> {
        let alice = UserId::from("alice");
        for _ in 0..200 {
            let stored = self.store.get(&alice).await.unwrap();
            if check(stored.as_ref()) {
                return stored;
            }
            tokio::task::yield_now().await;
        }
        panic!("stored session never reached the expected state");
    }
}

fn empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", "alice")
        .body(Body::empty())
        .unwrap()
}

fn ask(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/session/messages")
        .header("x-user-id", "alice")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(file_name: &str, mime: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "documind-test-boundary";
    let mut body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: {mime}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/session/document")
        .header("x-user-id", "alice")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn stored_image(messages: Vec<ChatMessage>) -> Session {
    Session {
        user_id: UserId::from("alice"),
        document: Some(Document {
            name: "saved.png".into(),
            upload_date: Utc::now(),
            body: DocumentBody::Image(InlineMedia {
                mime_type: "image/png".into(),
                inline_data: Arc::from("aGVsbG8="),
            }),
        }),
        messages,
        last_updated: Utc::now(),
    }
}

//=========================================================================================
// Identity and restore
//=========================================================================================

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/session")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_visit_starts_an_empty_ready_session() {
    let app = TestApp::new();
    let session = app.get_session().await;
    assert_eq!(
        session,
        json!({ "phase": "ready", "document": null, "messages": [] })
    );
}

#[tokio::test]
async fn stored_session_is_restored_on_first_visit() {
    let app = TestApp::new();
    app.store
        .put(&stored_image(vec![
            ChatMessage::upload_acknowledgment("saved.png"),
            ChatMessage::user("what is it?"),
        ]))
        .await
        .unwrap();

    let session = app.get_session().await;
    assert_eq!(session["document"]["name"], "saved.png");
    assert_eq!(session["document"]["kind"], "image");
    assert_eq!(session["document"]["total_pages"], 1);
    assert!(session["document"].get("inline_data").is_none());
    assert_eq!(session["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn orphaned_history_is_not_restored() {
    let app = TestApp::new();
    let mut orphan = stored_image(vec![ChatMessage::user("dangling")]);
    orphan.document = None;
    app.store.put(&orphan).await.unwrap();

    let session = app.get_session().await;
    assert_eq!(session["document"], Value::Null);
    assert_eq!(session["messages"], json!([]));
}

//=========================================================================================
// Upload
//=========================================================================================

#[tokio::test]
async fn image_upload_resets_history_and_is_saved() {
    let app = TestApp::new();
    let response = app
        .send(upload("chart.png", "image/png", b"\x89PNG fake image"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let session = json_body(response).await;
    assert_eq!(session["document"]["kind"], "image");
    assert_eq!(session["document"]["mime_type"], "image/png");
    let messages = session["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "model");
    assert!(messages[0]["text"]
        .as_str()
        .unwrap()
        .contains("I have processed **chart.png**"));

    let saved = app.stored_when(|s| s.is_some()).await.unwrap();
    assert_eq!(saved.document.unwrap().name, "chart.png");
}

#[tokio::test]
async fn unsupported_file_type_is_rejected() {
    let app = TestApp::new();
    let response = app.send(upload("notes.txt", "text/plain", b"hello")).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let session = app.get_session().await;
    assert_eq!(session["document"], Value::Null);
}

#[tokio::test]
async fn oversized_file_is_rejected() {
    let app = TestApp::with_normalizer(DocumentNormalizer::new().with_max_bytes(8));
    let response = app
        .send(upload("big.png", "image/png", &[0u8; 16]))
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn unreadable_pdf_is_unprocessable() {
    let app = TestApp::new();
    let response = app
        .send(upload("broken.pdf", "application/pdf", b"not really a pdf"))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

//=========================================================================================
// Questions
//=========================================================================================

#[tokio::test]
async fn asking_without_a_document_conflicts() {
    let app = TestApp::new();
    let response = app.send(ask(json!({ "question": "hello?" }))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(app.backend.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn blank_question_is_a_bad_request() {
    let app = TestApp::new();
    app.upload_image().await;
    let response = app.send(ask(json!({ "question": "   " }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn question_and_answer_are_appended_and_saved() {
    let app = TestApp::new();
    app.upload_image().await;

    let response = app
        .send(ask(json!({ "question": "What does the chart show?" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["backend_failed"], false);
    assert_eq!(body["question"]["role"], "user");
    assert_eq!(body["answer"]["text"], "It shows steady growth.");
    assert!(body["answer"].get("citations").is_none());

    let saved = app.stored_when(|s| s.map_or(false, |s| s.messages.len() == 3)).await;
    assert_eq!(saved.unwrap().messages[2].text, "It shows steady growth.");

    // Media primer, acknowledgment, the replayed upload message, then the question.
    let requests = app.backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, ModelCatalog::default().fast_model);
    assert_eq!(requests[0].contents.len(), 4);
    let last = requests[0].contents.last().unwrap();
    assert_eq!(last.parts[0].as_text(), Some("What does the chart show?"));
}

#[tokio::test]
async fn thinking_mode_selects_the_heavy_tier_with_a_budget() {
    let app = TestApp::new();
    app.upload_image().await;

    let response = app
        .send(ask(json!({ "question": "Explain it", "mode": "thinking" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let requests = app.backend.requests.lock().unwrap();
    let catalog = ModelCatalog::default();
    assert_eq!(requests[0].model, catalog.pro_model);
    assert_eq!(
        requests[0].config.thinking_budget,
        Some(catalog.thinking_budget)
    );
}

#[tokio::test]
async fn backend_failure_records_an_apology() {
    let app = TestApp::new();
    app.upload_image().await;
    app.backend.fail.store(true, Ordering::SeqCst);

    let response = app.send(ask(json!({ "question": "Anything?" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["backend_failed"], true);
    assert_eq!(body["answer"]["text"], BACKEND_APOLOGY);

    // The conversation stays usable.
    app.backend.fail.store(false, Ordering::SeqCst);
    let response = app.send(ask(json!({ "question": "Try again?" }))).await;
    assert_eq!(json_body(response).await["backend_failed"], false);

    let session = app.get_session().await;
    assert_eq!(session["messages"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn answer_is_dropped_when_the_chat_is_reset_mid_question() {
    let app = TestApp::new();
    app.upload_image().await;
    app.stored_when(|s| s.is_some()).await;

    let pending = app.ask_in_flight("What does the chart show?").await;
    let response = app.send(empty("DELETE", "/session")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    app.backend.gate.notify_one();
    let response = pending.await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let session = app.get_session().await;
    assert_eq!(session["document"], Value::Null);
    assert_eq!(session["messages"], json!([]));
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert!(app.store.get(&UserId::from("alice")).await.unwrap().is_none());
}

#[tokio::test]
async fn answer_is_dropped_when_the_document_is_replaced_mid_question() {
    let app = TestApp::new();
    app.upload_image().await;

    let pending = app.ask_in_flight("What does the chart show?").await;
    let response = app
        .send(upload("photo.png", "image/png", b"\x89PNG another image"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    app.backend.gate.notify_one();
    let response = pending.await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let session = app.get_session().await;
    assert_eq!(session["document"]["name"], "photo.png");
    let messages = session["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_ne!(messages[0]["text"], "It shows steady growth.");

    let saved = app
        .stored_when(|s| {
            s.and_then(|s| s.document.as_ref())
                .map_or(false, |d| d.name == "photo.png")
        })
        .await
        .unwrap();
    assert_eq!(saved.messages.len(), 1);
}

//=========================================================================================
// Clear, new chat, export, sign-out
//=========================================================================================

#[tokio::test]
async fn clearing_messages_keeps_the_document() {
    let app = TestApp::new();
    app.upload_image().await;

    let response = app.send(empty("DELETE", "/session/messages")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let session = app.get_session().await;
    assert_eq!(session["document"]["name"], "chart.png");
    assert_eq!(session["messages"], json!([]));
}

#[tokio::test]
async fn new_chat_deletes_the_stored_session() {
    let app = TestApp::new();
    app.upload_image().await;
    app.stored_when(|s| s.is_some()).await;

    let response = app.send(empty("DELETE", "/session")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(app.store.get(&UserId::from("alice")).await.unwrap().is_none());
    let session = app.get_session().await;
    assert_eq!(session["document"], Value::Null);
    assert_eq!(session["messages"], json!([]));
}

#[tokio::test]
async fn export_downloads_a_transcript() {
    let app = TestApp::new();
    app.upload_image().await;

    let response = app.send(empty("GET", "/session/export")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("chart.png_chat_history.txt"));

    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.starts_with("DocuMind AI Chat Log\nDocument: chart.png\n"));
    assert!(text.contains("AI:\nI have processed **chart.png**"));
}

#[tokio::test]
async fn export_without_messages_is_not_found() {
    let app = TestApp::new();
    app.upload_image().await;
    app.send(empty("DELETE", "/session/messages")).await;

    let response = app.send(empty("GET", "/session/export")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sign_out_clears_storage_and_the_controller() {
    let app = TestApp::new();
    app.upload_image().await;
    app.stored_when(|s| s.is_some()).await;

    let response = app.send(empty("POST", "/session/sign-out")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(app.state.sessions.is_empty());
    assert!(app.store.is_empty().await);
}
