//! The message append pipeline.
//!
//! One invocation loads the owner's conversation, appends the user turn,
//! asks the agent for a reply, appends it, recomputes metadata, and saves.
//! Nothing is written until the final save, and that save is a single
//! transaction, so a failure anywhere leaves the stored conversation exactly
//! as it was.

use parlance_agent::{GenerationError, ResponseGenerator};
use parlance_conversations::{
    create_conversation, get_conversation, list_conversations, recompute, save_conversation,
    ConversationError,
};
use parlance_db::DbPool;
use parlance_types::{Conversation, ConversationSummary, MessageRole};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::locks::ConversationLocks;

/// Errors surfaced by conversation operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Absent, or owned by someone else.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// The agent failed or did not answer in time.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Reading or writing the store failed.
    #[error("store failure: {0}")]
    Store(String),
}

impl From<ConversationError> for PipelineError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::NotFound(id) => PipelineError::NotFound(id),
            other => PipelineError::Store(other.to_string()),
        }
    }
}

/// Result of a successful append.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub reply_message: String,
    pub reply_audio_url: Option<String>,
    /// The conversation as persisted, both new messages included.
    pub conversation: Conversation,
}

/// Conversation operations over an explicit pool and agent.
pub struct MessagePipeline {
    pool: DbPool,
    generator: Arc<dyn ResponseGenerator>,
    locks: ConversationLocks,
    generation_timeout: Duration,
}

impl MessagePipeline {
    pub fn new(
        pool: DbPool,
        generator: Arc<dyn ResponseGenerator>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            generator,
            locks: ConversationLocks::new(),
            generation_timeout,
        }
    }

    pub async fn create(
        &self,
        owner_id: &str,
        title: Option<String>,
    ) -> Result<Conversation, PipelineError> {
        let owner = owner_id.to_string();
        with_connection(&self.pool, move |conn| {
            create_conversation(conn, &owner, title.as_deref())
        })
        .await
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<ConversationSummary>, PipelineError> {
        let owner = owner_id.to_string();
        with_connection(&self.pool, move |conn| list_conversations(conn, &owner)).await
    }

    pub async fn get(
        &self,
        owner_id: &str,
        conversation_id: &str,
    ) -> Result<Conversation, PipelineError> {
        let owner = owner_id.to_string();
        let id = conversation_id.to_string();
        with_connection(&self.pool, move |conn| get_conversation(conn, &owner, &id)).await
    }

    /// Appends a user message and the agent's reply as one unit.
    ///
    /// Appends to the same conversation run one at a time. The agent call
    /// is bounded by the configured timeout. If generation or the final
    /// save fails, nothing is persisted and no reply is returned; a reply
    /// that fails to save is handed back to the generator to discard.
    pub async fn append_user_message(
        &self,
        owner_id: &str,
        conversation_id: &str,
        content: &str,
        audio_url: Option<String>,
    ) -> Result<AppendOutcome, PipelineError> {
        let _turn = self.locks.acquire(conversation_id).await;

        let mut conversation = self.get(owner_id, conversation_id).await?;

        conversation.push_message(MessageRole::User, content, audio_url);

        let reply = match tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(content, &conversation.messages),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(GenerationError::Timeout(self.generation_timeout).into()),
        };

        conversation.push_message(
            MessageRole::Assistant,
            reply.message(),
            reply.audio_url().map(str::to_string),
        );
        conversation.metadata = recompute(&conversation, &reply);

        let saved = with_connection(&self.pool, move |conn| {
            save_conversation(conn, &mut conversation)?;
            Ok(conversation)
        })
        .await;

        let conversation = match saved {
            Ok(conversation) => conversation,
            Err(e) => {
                self.generator.discard(&reply).await;
                return Err(e);
            }
        };

        tracing::info!(
            conversation_id = %conversation.id,
            owner_id = owner_id,
            messages = conversation.messages.len(),
            "conversation turn persisted"
        );

        Ok(AppendOutcome {
            reply_message: reply.message().to_string(),
            reply_audio_url: reply.audio_url().map(str::to_string),
            conversation,
        })
    }
}

/// Runs a store operation on a pooled connection off the async runtime.
async fn with_connection<T, F>(pool: &DbPool, op: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, ConversationError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| PipelineError::Store(format!("db connection failed: {}", e)))?;
        op(&conn).map_err(PipelineError::from)
    })
    .await
    .map_err(|e| PipelineError::Store(format!("task join error: {}", e)))?
}
