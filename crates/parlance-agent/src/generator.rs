use async_trait::async_trait;
use parlance_types::{GeneratedReply, Message};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::GenerationError;
use crate::persona::AgentPersona;

/// Produces the agent's answer to a user turn.
///
/// `history` is the full conversation in order and already ends with the
/// user message whose text is `content`.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        content: &str,
        history: &[Message],
    ) -> Result<GeneratedReply, GenerationError>;

    /// Called when a generated reply will never be persisted, so artifacts
    /// it references (reply audio) can be removed.
    async fn discard(&self, _reply: &GeneratedReply) {}
}

/// Answers locally without calling any backend.
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator {
    persona: AgentPersona,
}

impl EchoGenerator {
    pub fn new(persona: AgentPersona) -> Self {
        Self { persona }
    }
}

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate(
        &self,
        content: &str,
        history: &[Message],
    ) -> Result<GeneratedReply, GenerationError> {
        let message = if history.len() <= 1 {
            format!("{} You said: {}", self.persona.greeting, content)
        } else {
            format!("You said: {}", content)
        };
        Ok(GeneratedReply::new(message))
    }
}

enum Step {
    Reply(GeneratedReply),
    Fail(String),
}

/// Plays back a fixed sequence of replies and failures.
///
/// Once the script runs out, the fallback reply (if any) is returned for
/// every further call; without one, calls fail.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Step>>,
    fallback: Option<GeneratedReply>,
    delay: Option<Duration>,
    histories: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            delay: None,
            histories: Mutex::new(Vec::new()),
        }
    }

    /// Queues a successful reply.
    pub fn reply(self, reply: GeneratedReply) -> Self {
        self.push(Step::Reply(reply))
    }

    /// Queues a failure.
    pub fn fail(self, reason: impl Into<String>) -> Self {
        self.push(Step::Fail(reason.into()))
    }

    /// Reply used after the script is exhausted.
    pub fn otherwise(mut self, reply: GeneratedReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Sleeps this long before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Histories received so far, one entry per call.
    pub fn histories(&self) -> Vec<Vec<Message>> {
        self.histories
            .lock()
            .map(|h| h.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
        self
    }

    fn next_step(&self) -> Option<Step> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _content: &str,
        history: &[Message],
    ) -> Result<GeneratedReply, GenerationError> {
        if let Ok(mut seen) = self.histories.lock() {
            seen.push(history.to_vec());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_step() {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail(reason)) => Err(GenerationError::Scripted(reason)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| GenerationError::Scripted("script exhausted".to_string())),
        }
    }
}
