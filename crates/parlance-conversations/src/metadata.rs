//! Derived conversation analytics.

use chrono::{DateTime, Utc};
use parlance_types::{Conversation, ConversationMetadata, GeneratedReply, Message, MessageRole};

/// Computes the metadata a conversation should carry after `reply` has been
/// appended to it.
///
/// - `updated` becomes the current time, or the newest message stamp if
///   that is later.
/// - `duration` spans the first user message to the latest message, rounded
///   to whole seconds; it stays unset while there is no user message.
/// - `sentiment` is replaced only when the reply carries one.
/// - `intents` grows by set union; a reply without intents removes nothing.
pub fn recompute(conversation: &Conversation, reply: &GeneratedReply) -> ConversationMetadata {
    recompute_at(conversation, reply, parlance_types::now())
}

/// Same as [`recompute`] with an explicit clock reading.
pub fn recompute_at(
    conversation: &Conversation,
    reply: &GeneratedReply,
    now: DateTime<Utc>,
) -> ConversationMetadata {
    let previous = &conversation.metadata;
    let mut metadata = previous.clone();

    // `updated` may not fall behind the previous value or any message.
    metadata.updated = conversation
        .messages
        .iter()
        .map(|m| m.timestamp)
        .chain([now, previous.updated])
        .max()
        .unwrap_or(now);

    if let Some(duration) = duration_secs(&conversation.messages) {
        metadata.duration = Some(duration);
    }

    if let Some(sentiment) = reply.sentiment() {
        metadata.sentiment = Some(sentiment.to_string());
    }

    metadata.intents.extend(reply.intents().iter().cloned());

    metadata
}

/// Whole seconds from the first user message to the latest message.
fn duration_secs(messages: &[Message]) -> Option<i64> {
    let first = messages.iter().find(|m| m.role == MessageRole::User)?;
    let latest = messages.iter().map(|m| m.timestamp).max()?;
    let millis = (latest - first.timestamp).num_milliseconds().max(0);
    Some((millis + 500) / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64, millis: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
            + Duration::seconds(secs)
            + Duration::milliseconds(millis)
    }

    fn message(role: MessageRole, ts: DateTime<Utc>) -> Message {
        Message {
            role,
            content: "x".to_string(),
            timestamp: ts,
            audio_url: None,
        }
    }

    fn conversation_with(messages: Vec<Message>) -> Conversation {
        let mut conv = Conversation::new("owner", None);
        conv.metadata.created = at(0, 0);
        conv.metadata.updated = at(0, 0);
        conv.messages = messages;
        conv
    }

    #[test]
    fn duration_spans_first_user_message_to_last_message() {
        let conv = conversation_with(vec![
            message(MessageRole::Assistant, at(0, 0)),
            message(MessageRole::User, at(10, 0)),
            message(MessageRole::Assistant, at(11, 0)),
            message(MessageRole::User, at(40, 0)),
            message(MessageRole::Assistant, at(52, 400)),
        ]);

        let meta = recompute_at(&conv, &GeneratedReply::new("ok"), at(60, 0));
        assert_eq!(meta.duration, Some(42));
    }

    #[test]
    fn duration_rounds_half_up() {
        let conv = conversation_with(vec![
            message(MessageRole::User, at(0, 0)),
            message(MessageRole::Assistant, at(2, 500)),
        ]);
        let meta = recompute_at(&conv, &GeneratedReply::new("ok"), at(3, 0));
        assert_eq!(meta.duration, Some(3));
    }

    #[test]
    fn no_user_message_leaves_duration_unset() {
        let conv = conversation_with(vec![message(MessageRole::Assistant, at(5, 0))]);
        let meta = recompute_at(&conv, &GeneratedReply::new("ok"), at(6, 0));
        assert_eq!(meta.duration, None);
    }

    #[test]
    fn sentiment_replaced_only_when_present() {
        let mut conv = conversation_with(vec![
            message(MessageRole::User, at(0, 0)),
            message(MessageRole::Assistant, at(1, 0)),
        ]);
        conv.metadata.sentiment = Some("neutral".to_string());

        let kept = recompute_at(&conv, &GeneratedReply::new("ok").with_sentiment(""), at(2, 0));
        assert_eq!(kept.sentiment.as_deref(), Some("neutral"));

        let replaced = recompute_at(
            &conv,
            &GeneratedReply::new("ok").with_sentiment("negative"),
            at(2, 0),
        );
        assert_eq!(replaced.sentiment.as_deref(), Some("negative"));
    }

    #[test]
    fn intents_accumulate_as_a_set() {
        let mut conv = conversation_with(vec![
            message(MessageRole::User, at(0, 0)),
            message(MessageRole::Assistant, at(1, 0)),
        ]);

        let first = GeneratedReply::new("a").with_intents(["billing"]);
        conv.metadata = recompute_at(&conv, &first, at(2, 0));

        let second = GeneratedReply::new("b").with_intents(["billing", "refund"]);
        conv.metadata = recompute_at(&conv, &second, at(3, 0));

        let empty = GeneratedReply::new("c");
        conv.metadata = recompute_at(&conv, &empty, at(4, 0));

        let intents: Vec<&str> = conv.metadata.intents.iter().map(String::as_str).collect();
        assert_eq!(intents, vec!["billing", "refund"]);
    }

    #[test]
    fn intents_are_case_sensitive() {
        let conv = conversation_with(vec![message(MessageRole::User, at(0, 0))]);
        let reply = GeneratedReply::new("a").with_intents(["Refund", "refund"]);
        let meta = recompute_at(&conv, &reply, at(1, 0));
        assert_eq!(meta.intents.len(), 2);
    }

    #[test]
    fn updated_never_moves_backwards() {
        let mut conv = conversation_with(vec![
            message(MessageRole::User, at(30, 0)),
            message(MessageRole::Assistant, at(31, 0)),
        ]);
        conv.metadata.updated = at(20, 0);

        // A clock reading behind the last message is clamped forward.
        let meta = recompute_at(&conv, &GeneratedReply::new("ok"), at(25, 0));
        assert_eq!(meta.updated, at(31, 0));
        assert!(meta.updated >= meta.created);
    }

    #[test]
    fn updated_covers_every_message_when_stamps_are_out_of_order() {
        let conv = conversation_with(vec![
            message(MessageRole::User, at(31, 0)),
            message(MessageRole::Assistant, at(30, 0)),
        ]);

        let meta = recompute_at(&conv, &GeneratedReply::new("ok"), at(30, 0));
        assert_eq!(meta.updated, at(31, 0));
        for m in &conv.messages {
            assert!(meta.updated >= m.timestamp);
        }
        assert_eq!(meta.duration, Some(0));
    }
}
