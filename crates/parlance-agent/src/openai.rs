//! OpenAI-compatible chat completions backend.

use async_trait::async_trait;
use parlance_types::{GeneratedReply, Message};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::AgentConfig;
use crate::error::GenerationError;
use crate::generator::ResponseGenerator;
use crate::speech::SpeechSynthesizer;

/// Upstream error bodies are cut to this many bytes before logging.
const MAX_ERROR_BODY_BYTES: usize = 512;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// The JSON object the persona prompt asks the model to answer with.
#[derive(Deserialize)]
struct AnnotatedReply {
    message: String,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    intents: Vec<String>,
}

/// Turns raw model output into a reply.
///
/// Output following the persona's JSON format yields a message with
/// annotations; anything else is taken verbatim as the message.
pub fn parse_reply(raw: &str) -> Result<GeneratedReply, GenerationError> {
    let trimmed = strip_code_fence(raw.trim());
    if trimmed.is_empty() {
        return Err(GenerationError::InvalidResponse(
            "empty completion".to_string(),
        ));
    }

    match serde_json::from_str::<AnnotatedReply>(trimmed) {
        Ok(annotated) if !annotated.message.trim().is_empty() => {
            Ok(GeneratedReply::new(annotated.message.trim())
                .with_sentiment(annotated.sentiment.unwrap_or_default())
                .with_intents(annotated.intents))
        }
        Ok(_) => Err(GenerationError::InvalidResponse(
            "completion has an empty message".to_string(),
        )),
        Err(_) => Ok(GeneratedReply::new(trimmed)),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Generates replies through `POST {base_url}/chat/completions`.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: String,
    speech: Option<SpeechSynthesizer>,
}

impl OpenAiGenerator {
    /// Builds a generator from config. Speech is enabled when
    /// `speech_model` is set; audio files are written to `upload_dir`.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Request` if the HTTP client cannot be built.
    pub fn new(config: &AgentConfig, upload_dir: impl Into<PathBuf>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("parlance/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = config.base_url.trim_end_matches('/');
        let speech = config.speech_model.as_deref().map(|model| {
            SpeechSynthesizer::new(
                client.clone(),
                base_url,
                &config.api_key,
                model,
                &config.persona.voice,
                upload_dir.into(),
            )
        });

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config.persona.system_prompt(),
            speech,
        })
    }

    async fn complete(&self, history: &[Message]) -> Result<String, GenerationError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: &self.system_prompt,
        });
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let request = ChatRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_ERROR_BODY_BYTES);
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse("no completion choices".to_string()))
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        _content: &str,
        history: &[Message],
    ) -> Result<GeneratedReply, GenerationError> {
        let raw = self.complete(history).await?;
        let reply = parse_reply(&raw)?;

        let Some(speech) = &self.speech else {
            return Ok(reply);
        };

        match speech.synthesize(reply.message()).await {
            Ok(url) => Ok(reply.with_audio_url(url)),
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed, replying with text only");
                Ok(reply)
            }
        }
    }

    async fn discard(&self, reply: &GeneratedReply) {
        if let (Some(speech), Some(url)) = (&self.speech, reply.audio_url()) {
            speech.discard(url).await;
        }
    }
}

pub(crate) fn truncate_on_char_boundary(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
