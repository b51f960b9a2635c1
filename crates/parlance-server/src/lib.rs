//! Parlance server library logic.

pub mod api;
pub mod api_conversations;
pub mod config;
pub mod locks;
pub mod middleware;
pub mod pipeline;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Extension, Json, Router,
};
use middleware::TokenVerifier;
use pipeline::MessagePipeline;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation operations, including the append pipeline.
    pub pipeline: Arc<MessagePipeline>,
    /// Bearer token verification.
    pub tokens: TokenVerifier,
    /// Directory reply audio is written to and served from.
    pub upload_dir: String,
    /// Allowed CORS origins; empty allows any.
    pub cors_origins: Vec<String>,
}

/// Maximum request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(parsed))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/conversations",
            post(api_conversations::create_conversation_handler)
                .get(api_conversations::list_conversations_handler),
        )
        .route(
            "/api/conversations/{conversationId}",
            get(api_conversations::get_conversation_handler),
        )
        .route(
            "/api/conversations/{conversationId}/messages",
            post(api_conversations::append_message_handler),
        )
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    let router = Router::new()
        .route("/health", get(health))
        .merge(protected_routes);

    // Reply audio is written lazily, so serve the directory even if absent.
    tracing::info!(path = %state.upload_dir, "serving reply audio at /uploads");
    let router = router.nest_service("/uploads", ServeDir::new(&state.upload_dir));

    let cors = cors_layer(&state.cors_origins);

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}
