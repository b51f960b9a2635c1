//! The agent's answer to a user turn.

/// A reply produced by the AI response service.
///
/// Annotations are optional. The constructors drop blank sentiment labels
/// and blank intents, so a present `sentiment` is always non-empty and an
/// empty `intents` slice always means "nothing new to record".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    message: String,
    audio_url: Option<String>,
    sentiment: Option<String>,
    intents: Vec<String>,
}

impl GeneratedReply {
    /// Creates a plain text reply with no annotations.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            audio_url: None,
            sentiment: None,
            intents: Vec::new(),
        }
    }

    pub fn with_audio_url(mut self, audio_url: impl Into<String>) -> Self {
        let url = audio_url.into();
        self.audio_url = (!url.trim().is_empty()).then_some(url);
        self
    }

    pub fn with_sentiment(mut self, sentiment: impl Into<String>) -> Self {
        let label = sentiment.into().trim().to_string();
        self.sentiment = (!label.is_empty()).then_some(label);
        self
    }

    pub fn with_intents<I, S>(mut self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intents = intents
            .into_iter()
            .map(Into::into)
            .filter(|i: &String| !i.trim().is_empty())
            .collect();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }

    pub fn sentiment(&self) -> Option<&str> {
        self.sentiment.as_deref()
    }

    pub fn intents(&self) -> &[String] {
        &self.intents
    }
}
