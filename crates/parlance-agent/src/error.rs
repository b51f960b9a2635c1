use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("agent request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("agent backend returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("invalid agent response: {0}")]
    InvalidResponse(String),

    #[error("agent did not answer within {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("speech synthesis error: {0}")]
    Speech(String),

    #[error("scripted failure: {0}")]
    Scripted(String),
}
