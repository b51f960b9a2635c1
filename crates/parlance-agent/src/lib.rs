//! AI response generation for Parlance conversations.
//!
//! The pipeline only ever talks to the [`ResponseGenerator`] trait: given
//! the newest user message and the full history, produce a reply with
//! optional sentiment, intents, and audio. Implementations:
//!
//! - [`OpenAiGenerator`]: an OpenAI-compatible chat completions backend,
//!   optionally rendering the reply to speech via [`SpeechSynthesizer`].
//! - [`EchoGenerator`]: a local stand-in used when no backend is configured.
//! - [`ScriptedGenerator`]: canned replies and failures for tests.
//!
//! The agent's voice and manner come from an [`AgentPersona`].

pub mod config;
pub mod error;
pub mod generator;
pub mod openai;
pub mod persona;
pub mod speech;

pub use config::AgentConfig;
pub use error::GenerationError;
pub use generator::{EchoGenerator, ResponseGenerator, ScriptedGenerator};
pub use openai::{parse_reply, OpenAiGenerator};
pub use persona::AgentPersona;
pub use speech::SpeechSynthesizer;
