//! Conversation persistence and derived analytics.
//!
//! [`store`] reads and writes conversation documents scoped to their owner.
//! [`metadata`] is the pure aggregation step that folds an agent reply into
//! a conversation's duration, sentiment, and intent set.
//!
//! Store functions take a borrowed [`rusqlite::Connection`] and never open
//! their own, so callers decide where blocking work runs and which pool the
//! connection comes from.

mod error;
pub mod metadata;
pub mod store;

pub use error::ConversationError;
pub use metadata::recompute;
pub use store::{create_conversation, get_conversation, list_conversations, save_conversation};
