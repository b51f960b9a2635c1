//! Shared types for the Parlance conversation backend.
//!
//! This crate holds the conversation document model used by every other
//! crate in the workspace: the store persists it, the aggregator derives
//! metadata from it, and the server serializes it onto the wire.
//!
//! All timestamps are UTC and truncated to microsecond precision so that a
//! conversation read back from storage is identical to the one that was
//! written.

pub mod reply;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub use reply::GeneratedReply;

/// Title assigned to conversations created without one.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Returns the current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Author of a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human owner of the conversation.
    User,
    /// The AI agent.
    Assistant,
}

impl MessageRole {
    /// Returns the storage label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("unknown message role: {}", s)),
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Who wrote the message.
    pub role: MessageRole,
    /// Text payload.
    pub content: String,
    /// Moment the message was appended to the conversation.
    pub timestamp: DateTime<Utc>,
    /// Optional reference to an audio artifact for this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// Derived analytics kept on every conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    /// Creation time, set once.
    pub created: DateTime<Utc>,
    /// Last mutation time; never moves backwards.
    pub updated: DateTime<Utc>,
    /// Seconds from the first user message to the last message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// Last sentiment label reported by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    /// Every intent label reported so far.
    #[serde(default)]
    pub intents: BTreeSet<String>,
}

impl ConversationMetadata {
    fn fresh(at: DateTime<Utc>) -> Self {
        Self {
            created: at,
            updated: at,
            duration: None,
            sentiment: None,
            intents: BTreeSet::new(),
        }
    }
}

/// A conversation between one owner and the AI agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Opaque identifier (UUID v4).
    pub id: String,
    /// Identifier of the owning user.
    pub owner_id: String,
    /// Free-text label.
    pub title: String,
    /// Messages in conversational order.
    pub messages: Vec<Message>,
    /// Derived analytics.
    pub metadata: ConversationMetadata,
    /// Storage revision used for optimistic concurrency; not part of the
    /// wire document.
    #[serde(skip)]
    pub version: i64,
}

impl Conversation {
    /// Creates an empty conversation for `owner_id`.
    ///
    /// A missing or whitespace-only title falls back to
    /// [`DEFAULT_CONVERSATION_TITLE`].
    pub fn new(owner_id: impl Into<String>, title: Option<&str>) -> Self {
        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE)
            .to_string();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            title,
            messages: Vec::new(),
            metadata: ConversationMetadata::fresh(now()),
            version: 0,
        }
    }

    /// Appends a message stamped with the current time and returns it.
    ///
    /// The stamp never precedes the previous message's, so timestamps stay
    /// in conversational order even if the wall clock steps back.
    pub fn push_message(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
        audio_url: Option<String>,
    ) -> &Message {
        let timestamp = match self.messages.last() {
            Some(last) => now().max(last.timestamp),
            None => now(),
        };
        self.messages.push(Message {
            role,
            content: content.into(),
            timestamp,
            audio_url,
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Returns the earliest message authored by the user, if any.
    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == MessageRole::User)
    }

    /// Projects the conversation to its listing form.
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// A conversation without its messages, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub metadata: ConversationMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conversation_defaults_blank_title() {
        assert_eq!(
            Conversation::new("u1", None).title,
            DEFAULT_CONVERSATION_TITLE
        );
        assert_eq!(
            Conversation::new("u1", Some("   ")).title,
            DEFAULT_CONVERSATION_TITLE
        );
        assert_eq!(Conversation::new("u1", Some("Billing")).title, "Billing");
    }

    #[test]
    fn non_blank_title_is_stored_as_given() {
        assert_eq!(
            Conversation::new("u1", Some("  Billing ")).title,
            "  Billing "
        );
    }

    #[test]
    fn message_timestamps_never_decrease() {
        let mut conv = Conversation::new("u1", None);
        conv.push_message(MessageRole::User, "Hi", None);
        // Simulate a wall clock that stepped back after the first message.
        conv.messages[0].timestamp = now() + chrono::Duration::seconds(30);

        let ahead = conv.messages[0].timestamp;
        let reply = conv.push_message(MessageRole::Assistant, "Hello", None);
        assert_eq!(reply.timestamp, ahead);
    }

    #[test]
    fn new_conversation_is_empty() {
        let conv = Conversation::new("u1", None);
        assert!(conv.messages.is_empty());
        assert_eq!(conv.metadata.created, conv.metadata.updated);
        assert!(conv.metadata.duration.is_none());
        assert!(conv.metadata.intents.is_empty());
        assert!(uuid::Uuid::parse_str(&conv.id).is_ok());
    }

    #[test]
    fn role_round_trips_through_label() {
        for role in [MessageRole::User, MessageRole::Assistant] {
            assert_eq!(role.as_str().parse::<MessageRole>(), Ok(role));
        }
        assert!("system".parse::<MessageRole>().is_err());
    }

    #[test]
    fn wire_shape_uses_camel_case_and_intent_array() {
        let mut conv = Conversation::new("owner-7", None);
        conv.push_message(MessageRole::User, "Hi", Some("/uploads/a.webm".into()));
        conv.metadata.intents.insert("greeting".into());

        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json["ownerId"], "owner-7");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["audioUrl"], "/uploads/a.webm");
        assert_eq!(json["metadata"]["intents"], serde_json::json!(["greeting"]));
        assert!(json.get("version").is_none());
        assert!(json["metadata"].get("duration").is_none());
    }
}
