#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use ecoquiz_api::{
    config::Config,
    create_router,
    models::quiz::{Question, Quiz, QuizAttempt, QuizLike, QuizOption, UserAnswer},
    services::AppState,
    store::{
        MemoryStore, Repositories, StoreError, StoreResult, Transaction, TransactionRunner,
    },
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub fn test_config() -> Config {
    Config {
        bcrypt_cost: 4,
        upload_dir: std::env::temp_dir().join(format!("ecoquiz-test-{}", uuid::Uuid::new_v4())),
        ..Config::default()
    }
}

/// App state over a fresh in-memory store
pub fn create_test_state() -> Arc<AppState> {
    create_test_state_with(Repositories::from_backend(Arc::new(MemoryStore::new())))
}

pub fn create_test_state_with(repos: Repositories) -> Arc<AppState> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    Arc::new(AppState::new(test_config(), repos, None))
}

pub fn create_test_app() -> Router {
    create_router(create_test_state())
}

/// Sends a request and decodes the JSON body (`Value::Null` when empty)
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

/// Registers a user and returns `(access_token, user_id)`
pub async fn register(app: &Router, username: &str) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "password123",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

pub async fn create_community(app: &Router, token: &str, name: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/communities",
        Some(token),
        Some(json!({
            "name": name,
            "description": "Test community",
            "allow_public_quiz_submission": false,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create community failed: {}", body);
    body["community_id"].as_str().unwrap().to_string()
}

/// Two questions: "Paris" and "42", two options each, ten minutes
pub fn sample_quiz(community_id: &str) -> Value {
    json!({
        "community_id": community_id,
        "title": "Capitals and numbers",
        "description": "A short quiz",
        "duration_minutes": 10,
        "is_published": true,
        "questions": [
            {
                "question_text": "Capital of France?",
                "explanation": "Paris has been the capital since 987.",
                "correct_answer": "Paris",
                "order_index": 0,
                "options": [
                    { "text": "Paris", "is_correct": true },
                    { "text": "Lyon", "is_correct": false }
                ]
            },
            {
                "question_text": "The answer to everything?",
                "correct_answer": "42",
                "order_index": 1,
                "options": [
                    { "text": "42", "is_correct": true },
                    { "text": "7", "is_correct": false }
                ]
            }
        ]
    })
}

pub async fn create_quiz(app: &Router, token: &str, community_id: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/quizzes",
        Some(token),
        Some(sample_quiz(community_id)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create quiz failed: {}", body);
    body["quiz_id"].as_str().unwrap().to_string()
}

/// Community owned by a fresh user plus the sample quiz: `(owner_token, community_id, quiz_id)`
pub async fn seed_quiz(app: &Router) -> (String, String, String) {
    let (token, _) = register(app, "owner").await;
    let community_id = create_community(app, &token, "Geography").await;
    let quiz_id = create_quiz(app, &token, &community_id).await;
    (token, community_id, quiz_id)
}

pub async fn submit(
    app: &Router,
    token: &str,
    quiz_id: &str,
    duration_minutes: i32,
    answers: Value,
) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        &format!("/api/quizzes/{}/submit", quiz_id),
        Some(token),
        Some(json!({ "duration_minutes": duration_minutes, "answers": answers })),
    )
    .await
}

/// Transactional write that `FailingStore` rejects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailingWrite {
    Options,
    Answers,
    LikeCounter,
}

/// Delegates to the memory store but fails one kind of transactional write
pub struct FailingStore {
    inner: Arc<MemoryStore>,
    fail: FailingWrite,
}

pub struct FailingTransaction {
    inner: Box<dyn Transaction>,
    fail: FailingWrite,
}

impl FailingTransaction {
    fn check(&self, write: FailingWrite) -> StoreResult<()> {
        if self.fail == write {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRunner for FailingStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin().await?,
            fail: self.fail,
        }))
    }
}

#[async_trait]
impl Transaction for FailingTransaction {
    async fn insert_quiz(&mut self, quiz: &Quiz) -> StoreResult<()> {
        self.inner.insert_quiz(quiz).await
    }
    async fn insert_questions(&mut self, questions: &[Question]) -> StoreResult<()> {
        self.inner.insert_questions(questions).await
    }
    async fn insert_options(&mut self, options: &[QuizOption]) -> StoreResult<()> {
        self.check(FailingWrite::Options)?;
        self.inner.insert_options(options).await
    }
    async fn count_attempts(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<u64> {
        self.inner.count_attempts(quiz_id, user_id).await
    }
    async fn insert_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        self.inner.insert_attempt(attempt).await
    }
    async fn insert_answers(&mut self, answers: &[UserAnswer]) -> StoreResult<()> {
        self.check(FailingWrite::Answers)?;
        self.inner.insert_answers(answers).await
    }
    async fn update_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        self.inner.update_attempt(attempt).await
    }
    async fn has_like(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<bool> {
        self.inner.has_like(quiz_id, user_id).await
    }
    async fn insert_like(&mut self, like: &QuizLike) -> StoreResult<()> {
        self.inner.insert_like(like).await
    }
    async fn delete_like(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<bool> {
        self.inner.delete_like(quiz_id, user_id).await
    }
    async fn adjust_likes(&mut self, quiz_id: &str, delta: i64) -> StoreResult<()> {
        self.check(FailingWrite::LikeCounter)?;
        self.inner.adjust_likes(quiz_id, delta).await
    }
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }
}

/// App whose transactions fail on `fail`, plus its state for store assertions
pub fn create_failing_app(fail: FailingWrite) -> (Router, Arc<AppState>) {
    let store = Arc::new(MemoryStore::new());
    let mut repos = Repositories::from_backend(store.clone());
    repos.transactions = Arc::new(FailingStore {
        inner: store,
        fail,
    });
    let state = create_test_state_with(repos);
    (create_router(state.clone()), state)
}
