#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};
use tempfile::TempDir;

use parley_api::auth::{AppState, AppStateInner};
use parley_api::storage::DiskBlobStore;
use parley_db::{Database, IdGenerator};
use parley_gateway::NotificationHub;

pub const JWT_SECRET: &str = "test-secret-for-integration";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    _blobs: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_limit(1024 * 1024).await
}

pub async fn spawn_app_with_limit(max_upload_bytes: usize) -> TestApp {
    let state = test_state(max_upload_bytes).await;
    let server = TestServer::new(parley_api::build_router(state.0.clone())).unwrap();
    TestApp {
        server,
        state: state.0,
        _blobs: state.1,
    }
}

/// Fresh state on an in-memory database and a temporary blob directory.
pub async fn test_state(max_upload_bytes: usize) -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_in_memory(IdGenerator::new(1).unwrap()).unwrap();
    let blobs = DiskBlobStore::new(dir.path().join("blobs")).await.unwrap();

    let state = Arc::new(AppStateInner {
        db,
        hub: NotificationHub::new(8),
        blobs: Arc::new(blobs),
        jwt_secret: JWT_SECRET.to_string(),
        max_upload_bytes,
    });
    (state, dir)
}

pub fn auth_header(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        format!("Bearer {}", token).parse().unwrap(),
    )
}

/// Register a user and return `(user_id, token)`.
pub async fn register(server: &TestServer, name: &str, phone: &str) -> (u64, String) {
    let res = server
        .post("/auth/register")
        .json(&json!({ "name": name, "phone": phone, "password": "correct horse" }))
        .await;
    res.assert_status(StatusCode::CREATED);

    let body: Value = res.json();
    (body["user_id"].as_u64().unwrap(), body["token"].as_str().unwrap().to_string())
}

/// Two registered users who are friends, with their shared conversation.
pub struct Pair {
    pub alice: (u64, String),
    pub bob: (u64, String),
    pub conversation_id: u64,
}

pub async fn befriend(server: &TestServer) -> Pair {
    let alice = register(server, "Alice", "1001").await;
    let bob = register(server, "Bob", "1002").await;

    let (h, v) = auth_header(&alice.1);
    let res = server
        .post("/friend-requests")
        .add_header(h, v)
        .json(&json!({ "receiver_id": bob.0, "message": "hi bob" }))
        .await;
    res.assert_status(StatusCode::CREATED);
    let request_id = res.json::<Value>()["request_id"].as_u64().unwrap();

    let (h, v) = auth_header(&bob.1);
    let res = server
        .post(&format!("/friend-requests/{}/accept", request_id))
        .add_header(h, v)
        .await;
    res.assert_status_ok();
    let conversation_id = res.json::<Value>()["conversation_id"].as_u64().unwrap();

    Pair {
        alice,
        bob,
        conversation_id,
    }
}

pub async fn send_text(server: &TestServer, token: &str, conversation_id: u64, content: &str) -> u64 {
    let (h, v) = auth_header(token);
    let res = server
        .post(&format!("/conversations/{}/messages", conversation_id))
        .add_header(h, v)
        .json(&json!({ "content": content }))
        .await;
    res.assert_status(StatusCode::CREATED);
    res.json::<Value>()["message_id"].as_u64().unwrap()
}

/// The caller's entry for `conversation_id` in their conversation list.
pub async fn summary(server: &TestServer, token: &str, conversation_id: u64) -> Option<Value> {
    let (h, v) = auth_header(token);
    let list: Vec<Value> = server.get("/conversations").add_header(h, v).await.json();
    list.into_iter()
        .find(|c| c["conversation_id"].as_u64() == Some(conversation_id))
}
