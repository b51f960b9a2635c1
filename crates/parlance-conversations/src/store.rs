//! Owner-scoped persistence for conversation documents.
//!
//! A conversation lives in two tables: one row in `conversations` holding
//! the title and metadata, and one row per message in
//! `conversation_messages` keyed by position. Every read is filtered by
//! `owner_id`; a conversation owned by someone else is reported exactly
//! like a missing one.

use chrono::{DateTime, SecondsFormat, Utc};
use parlance_types::{Conversation, ConversationMetadata, ConversationSummary, Message};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

use crate::error::ConversationError;

/// Creates and persists a new empty conversation.
///
/// A missing or blank `title` is replaced with the default placeholder.
///
/// # Errors
///
/// Returns `ConversationError::Database` on SQL failure.
pub fn create_conversation(
    conn: &Connection,
    owner_id: &str,
    title: Option<&str>,
) -> Result<Conversation, ConversationError> {
    let conversation = Conversation::new(owner_id, title);
    let intents_json = serde_json::to_string(&conversation.metadata.intents)?;

    conn.execute(
        "INSERT INTO conversations (
            id, owner_id, title, created_at, updated_at,
            duration_secs, sentiment, intents_json, version
        ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, ?7)",
        params![
            conversation.id,
            conversation.owner_id,
            conversation.title,
            format_timestamp(&conversation.metadata.created),
            format_timestamp(&conversation.metadata.updated),
            intents_json,
            conversation.version,
        ],
    )?;

    tracing::debug!(
        conversation_id = %conversation.id,
        owner_id = owner_id,
        "conversation created"
    );

    Ok(conversation)
}

/// Lists the owner's conversations without their messages, most recently
/// updated first.
///
/// # Errors
///
/// Returns `ConversationError::Database` on SQL failure.
pub fn list_conversations(
    conn: &Connection,
    owner_id: &str,
) -> Result<Vec<ConversationSummary>, ConversationError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, created_at, updated_at, duration_secs, sentiment, intents_json
         FROM conversations
         WHERE owner_id = ?1
         ORDER BY updated_at DESC, id ASC",
    )?;

    let rows = stmt.query_map([owner_id], |row| {
        Ok(ConversationSummary {
            id: row.get(0)?,
            title: row.get(1)?,
            metadata: map_metadata(row, 2)?,
        })
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        summaries.push(row?);
    }
    Ok(summaries)
}

/// Fetches a full conversation, messages included.
///
/// # Errors
///
/// Returns `ConversationError::NotFound` if no conversation with `id` is
/// owned by `owner_id`, or `ConversationError::Database` on SQL failure.
pub fn get_conversation(
    conn: &Connection,
    owner_id: &str,
    id: &str,
) -> Result<Conversation, ConversationError> {
    let mut conversation = conn
        .query_row(
            "SELECT id, owner_id, title, version,
                    created_at, updated_at, duration_secs, sentiment, intents_json
             FROM conversations
             WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
            |row| {
                Ok(Conversation {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    title: row.get(2)?,
                    version: row.get(3)?,
                    metadata: map_metadata(row, 4)?,
                    messages: Vec::new(),
                })
            },
        )
        .optional()?
        .ok_or_else(|| ConversationError::NotFound(id.to_string()))?;

    let mut stmt = conn.prepare(
        "SELECT role, content, timestamp, audio_url
         FROM conversation_messages
         WHERE conversation_id = ?1
         ORDER BY position ASC",
    )?;
    let rows = stmt.query_map([id], map_row_to_message)?;
    for row in rows {
        conversation.messages.push(row?);
    }

    Ok(conversation)
}

/// Persists the full current state of a conversation.
///
/// The metadata row is only overwritten if its stored `version` still
/// matches the one the conversation was loaded with; on success the
/// in-memory `version` is advanced. Messages are append-only, so only
/// positions not yet stored are inserted. Everything happens in one
/// transaction: either the whole new state lands or none of it does.
///
/// # Errors
///
/// Returns `ConversationError::Conflict` if another writer saved first,
/// `ConversationError::NotFound` if the conversation no longer exists for
/// this owner, or `ConversationError::Database` on SQL failure.
pub fn save_conversation(
    conn: &Connection,
    conversation: &mut Conversation,
) -> Result<(), ConversationError> {
    let intents_json = serde_json::to_string(&conversation.metadata.intents)?;
    let tx = conn.unchecked_transaction()?;

    let updated = tx.execute(
        "UPDATE conversations
         SET title = ?1, updated_at = ?2, duration_secs = ?3, sentiment = ?4,
             intents_json = ?5, version = version + 1
         WHERE id = ?6 AND owner_id = ?7 AND version = ?8",
        params![
            conversation.title,
            format_timestamp(&conversation.metadata.updated),
            conversation.metadata.duration,
            conversation.metadata.sentiment,
            intents_json,
            conversation.id,
            conversation.owner_id,
            conversation.version,
        ],
    )?;

    if updated == 0 {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1 AND owner_id = ?2)",
            params![conversation.id, conversation.owner_id],
            |row| row.get(0),
        )?;
        return Err(if exists {
            ConversationError::Conflict(conversation.id.clone())
        } else {
            ConversationError::NotFound(conversation.id.clone())
        });
    }

    {
        let mut insert = tx.prepare(
            "INSERT INTO conversation_messages
                (conversation_id, position, role, content, timestamp, audio_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (conversation_id, position) DO NOTHING",
        )?;
        for (position, message) in conversation.messages.iter().enumerate() {
            insert.execute(params![
                conversation.id,
                position as i64,
                message.role.as_str(),
                message.content,
                format_timestamp(&message.timestamp),
                message.audio_url,
            ])?;
        }
    }

    tx.commit()?;
    conversation.version += 1;
    Ok(())
}

/// Formats a timestamp as fixed-width RFC 3339 so text order is time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads the five metadata columns starting at `start`:
/// created, updated, duration, sentiment, intents.
fn map_metadata(row: &Row, start: usize) -> rusqlite::Result<ConversationMetadata> {
    let intents_raw: String = row.get(start + 4)?;
    let intents: BTreeSet<String> = serde_json::from_str(&intents_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(start + 4, Type::Text, Box::new(e))
    })?;

    Ok(ConversationMetadata {
        created: parse_timestamp(row, start)?,
        updated: parse_timestamp(row, start + 1)?,
        duration: row.get(start + 2)?,
        sentiment: row.get(start + 3)?,
        intents,
    })
}

fn map_row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let role_raw: String = row.get(0)?;
    let role = role_raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.into())
    })?;

    Ok(Message {
        role,
        content: row.get(1)?,
        timestamp: parse_timestamp(row, 2)?,
        audio_url: row.get(3)?,
    })
}
