use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::persona::AgentPersona;

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the OpenAI-compatible agent backend.
#[derive(Clone, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the API, e.g. `https://api.openai.com/v1`. Empty disables
    /// the backend.
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Chat completions model.
    #[serde(default = "default_model")]
    pub model: String,
    /// Speech model for reply audio; unset means text-only replies.
    #[serde(default)]
    pub speech_model: Option<String>,
    /// Upper bound on a single generation, speech included. Default: 30.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub persona: AgentPersona,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: default_model(),
            speech_model: None,
            timeout_secs: default_timeout_secs(),
            persona: AgentPersona::default(),
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("speech_model", &self.speech_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("persona", &self.persona.name)
            .finish()
    }
}

impl AgentConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Whether a remote backend is configured.
    pub fn is_enabled(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
