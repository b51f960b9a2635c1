use crate::api::ApiError;
use crate::middleware::OwnerContext;
use crate::pipeline::PipelineError;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Json,
};
use parlance_types::{Conversation, ConversationSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum length for a conversation title.
const MAX_TITLE_LEN: usize = 256;
/// Maximum length for a message body (32 KiB).
const MAX_CONTENT_LEN: usize = 32 * 1024;
/// Maximum length for a client-supplied audio reference.
const MAX_AUDIO_URL_LEN: usize = 2048;

const NOT_FOUND_MESSAGE: &str = "Conversation not found";

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    pub content: Option<String>,
    pub audio_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub conversation: Conversation,
}

/// Maps a pipeline failure onto its status code and stable message,
/// logging anything that is not a plain 404.
fn pipeline_err_to_api(e: PipelineError, operation: &'static str) -> ApiError {
    match e {
        PipelineError::NotFound(_) => ApiError::NotFound(NOT_FOUND_MESSAGE.to_string()),
        err => {
            tracing::error!(error = %err, operation, "conversation operation failed");
            ApiError::InternalServerError(operation.to_string())
        }
    }
}

/// POST /api/conversations
///
/// The body is optional; an empty body creates an untitled conversation.
pub async fn create_conversation_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner_id)): Extension<OwnerContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let payload: CreateConversationRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateConversationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?
    };

    if let Some(ref title) = payload.title {
        if title.len() > MAX_TITLE_LEN {
            return Err(ApiError::BadRequest("title is too long".to_string()));
        }
    }

    let conversation = state
        .pipeline
        .create(&owner_id, payload.title)
        .await
        .map_err(|e| pipeline_err_to_api(e, "Error creating conversation"))?;

    tracing::info!(
        conversation_id = %conversation.id,
        owner_id = %owner_id,
        "conversation created"
    );

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /api/conversations
pub async fn list_conversations_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner_id)): Extension<OwnerContext>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    state
        .pipeline
        .list(&owner_id)
        .await
        .map(Json)
        .map_err(|e| pipeline_err_to_api(e, "Error fetching conversations"))
}

/// GET /api/conversations/{conversationId}
pub async fn get_conversation_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner_id)): Extension<OwnerContext>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    state
        .pipeline
        .get(&owner_id, &conversation_id)
        .await
        .map(Json)
        .map_err(|e| pipeline_err_to_api(e, "Error fetching conversation"))
}

/// POST /api/conversations/{conversationId}/messages
pub async fn append_message_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner_id)): Extension<OwnerContext>,
    Path(conversation_id): Path<String>,
    payload: Result<Json<AppendMessageRequest>, JsonRejection>,
) -> Result<Json<AppendMessageResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected message body");
        ApiError::BadRequest("content is required".to_string())
    })?;

    let content = payload
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("content is required".to_string()))?;
    if content.len() > MAX_CONTENT_LEN {
        return Err(ApiError::BadRequest("content is too long".to_string()));
    }

    let audio_url = payload.audio_url.filter(|u| !u.trim().is_empty());
    if audio_url.as_ref().is_some_and(|u| u.len() > MAX_AUDIO_URL_LEN) {
        return Err(ApiError::BadRequest("audioUrl is too long".to_string()));
    }

    let outcome = state
        .pipeline
        .append_user_message(&owner_id, &conversation_id, &content, audio_url)
        .await
        .map_err(|e| pipeline_err_to_api(e, "Error processing message"))?;

    Ok(Json(AppendMessageResponse {
        message: outcome.reply_message,
        audio_url: outcome.reply_audio_url,
        conversation: outcome.conversation,
    }))
}
