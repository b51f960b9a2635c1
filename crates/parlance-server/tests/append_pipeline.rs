mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use common::{append, create, fetch, setup, setup_with_timeout, token_for};
use parlance_agent::{GenerationError, ResponseGenerator, ScriptedGenerator};
use parlance_db::DbPool;
use parlance_types::{GeneratedReply, Message};
use serde_json::json;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

#[tokio::test]
async fn generation_failure_leaves_conversation_untouched() {
    let agent = Arc::new(
        ScriptedGenerator::new()
            .reply(
                GeneratedReply::new("Hello!")
                    .with_sentiment("positive")
                    .with_intents(["greeting"]),
            )
            .fail("backend down"),
    );
    let app = setup(agent.clone());
    let token = token_for("user-1");
    let created = create(&app.router, &token, None).await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = append(&app.router, &token, id, "Hi").await;
    assert_eq!(status, StatusCode::OK);
    let (_, before) = fetch(&app.router, &token, id).await;

    let (status, body) = append(&app.router, &token, id, "Are you there?").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Error processing message");
    assert!(!body.to_string().contains("backend down"));

    let (_, after) = fetch(&app.router, &token, id).await;
    assert_eq!(before, after);
    assert_eq!(after["messages"].as_array().unwrap().len(), 2);

    // The failed call still saw the pending user message.
    let histories = agent.histories();
    assert_eq!(histories[1].len(), 3);
    assert_eq!(histories[1][2].content, "Are you there?");
}

#[tokio::test]
async fn slow_generation_times_out_without_saving() {
    let agent = Arc::new(
        ScriptedGenerator::new()
            .otherwise(GeneratedReply::new("too late"))
            .with_delay(Duration::from_millis(500)),
    );
    let app = setup_with_timeout(agent, Duration::from_millis(50));
    let token = token_for("user-1");
    let created = create(&app.router, &token, None).await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = append(&app.router, &token, id, "Hi").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Error processing message");

    let (_, stored) = fetch(&app.router, &token, id).await;
    assert_eq!(stored, created);
}

#[tokio::test]
async fn intents_accumulate_and_sentiment_persists() {
    let agent = Arc::new(
        ScriptedGenerator::new()
            .reply(
                GeneratedReply::new("Hello!")
                    .with_sentiment("positive")
                    .with_intents(["greeting"]),
            )
            .reply(GeneratedReply::new("Let me check.").with_intents(["billing", "greeting"]))
            .reply(GeneratedReply::new("Anything else?")),
    );
    let app = setup(agent);
    let token = token_for("user-1");
    let created = create(&app.router, &token, None).await;
    let id = created["id"].as_str().unwrap();

    for content in ["Hi", "My invoice is wrong", "Thanks"] {
        let (status, _) = append(&app.router, &token, id, content).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, stored) = fetch(&app.router, &token, id).await;
    assert_eq!(stored["messages"].as_array().unwrap().len(), 6);
    assert_eq!(stored["metadata"]["intents"], json!(["billing", "greeting"]));
    assert_eq!(stored["metadata"]["sentiment"], "positive");
}

#[tokio::test]
async fn concurrent_appends_to_one_conversation_keep_every_message() {
    let agent = Arc::new(
        ScriptedGenerator::new()
            .otherwise(GeneratedReply::new("ok"))
            .with_delay(Duration::from_millis(20)),
    );
    let app = setup(agent);
    let token = token_for("user-1");
    let created = create(&app.router, &token, None).await;
    let id = created["id"].as_str().unwrap().to_string();

    let (a, b) = tokio::join!(
        append(&app.router, &token, &id, "first"),
        append(&app.router, &token, &id, "second"),
    );
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);

    let (_, stored) = fetch(&app.router, &token, &id).await;
    let messages = stored["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, ["user", "assistant", "user", "assistant"]);

    let mut user_contents: Vec<&str> = messages
        .iter()
        .filter(|m| m["role"] == "user")
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    user_contents.sort();
    assert_eq!(user_contents, ["first", "second"]);
}

/// Replies successfully with audio, but first bumps the stored revision as
/// if another process had written the conversation in the meantime.
struct InterferingGenerator {
    pool: OnceLock<DbPool>,
    discarded: Mutex<Vec<String>>,
}

#[async_trait]
impl ResponseGenerator for InterferingGenerator {
    async fn generate(
        &self,
        _content: &str,
        history: &[Message],
    ) -> Result<GeneratedReply, GenerationError> {
        assert!(!history.is_empty());
        let conn = self.pool.get().unwrap().get().unwrap();
        conn.execute("UPDATE conversations SET version = version + 1", [])
            .unwrap();
        Ok(GeneratedReply::new("you will never see this").with_audio_url("/uploads/lost.mp3"))
    }

    async fn discard(&self, reply: &GeneratedReply) {
        if let Some(url) = reply.audio_url() {
            self.discarded.lock().unwrap().push(url.to_string());
        }
    }
}

#[tokio::test]
async fn failed_save_after_generation_returns_error_not_reply() {
    let agent = Arc::new(InterferingGenerator {
        pool: OnceLock::new(),
        discarded: Mutex::new(Vec::new()),
    });
    let app = setup(agent.clone());
    agent.pool.set(app.pool.clone()).ok();

    let token = token_for("user-1");
    let created = create(&app.router, &token, None).await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = append(&app.router, &token, id, "Hi").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Error processing message");
    assert!(body.get("message").is_none());

    let (_, stored) = fetch(&app.router, &token, id).await;
    assert_eq!(stored["messages"], json!([]));

    assert_eq!(*agent.discarded.lock().unwrap(), vec!["/uploads/lost.mp3".to_string()]);
}
