//! Error types for conversation storage.

/// Errors that can occur during conversation store operations.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// A database operation failed.
    #[error("conversation database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The conversation does not exist or belongs to someone else.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// The stored revision moved on since the conversation was loaded.
    #[error("conversation {0} was modified concurrently")]
    Conflict(String),

    /// JSON serialization or deserialization failed.
    #[error("conversation serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
