#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use parlance_agent::ResponseGenerator;
use parlance_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use parlance_server::middleware::{Claims, TokenVerifier};
use parlance_server::pipeline::MessagePipeline;
use parlance_server::{app, AppState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "test-secret";

pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    _dir: TempDir,
}

pub fn setup(generator: Arc<dyn ResponseGenerator>) -> TestApp {
    setup_with_timeout(generator, Duration::from_secs(5))
}

pub fn setup_with_timeout(generator: Arc<dyn ResponseGenerator>, timeout: Duration) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("parlance.db");
    let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }

    let state = AppState {
        pipeline: Arc::new(MessagePipeline::new(pool.clone(), generator, timeout)),
        tokens: TokenVerifier::from_secret(SECRET),
        upload_dir: dir.path().join("uploads").to_string_lossy().into_owned(),
        cors_origins: vec![],
    };

    TestApp {
        router: app(state),
        pool,
        _dir: dir,
    }
}

pub fn token_for(user_id: &str) -> String {
    token_signed_with(user_id, SECRET)
}

pub fn token_signed_with(user_id: &str, secret: &str) -> String {
    let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as u64;
    encode(
        &Header::default(),
        &Claims {
            user_id: user_id.to_string(),
            exp,
        },
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

/// Sends one request and returns the status with the decoded JSON body
/// (`Value::Null` when the body is empty).
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn create(router: &Router, token: &str, body: Option<&str>) -> Value {
    let (status, json) = send(router, Method::POST, "/api/conversations", Some(token), body).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", json);
    json
}

pub async fn append(router: &Router, token: &str, id: &str, content: &str) -> (StatusCode, Value) {
    let body = serde_json::json!({ "content": content }).to_string();
    send(
        router,
        Method::POST,
        &format!("/api/conversations/{}/messages", id),
        Some(token),
        Some(&body),
    )
    .await
}

pub async fn fetch(router: &Router, token: &str, id: &str) -> (StatusCode, Value) {
    send(
        router,
        Method::GET,
        &format!("/api/conversations/{}", id),
        Some(token),
        None,
    )
    .await
}
