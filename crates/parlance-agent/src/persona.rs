//! The character the agent plays in every conversation.

use serde::Deserialize;

/// Instructions appended to every system prompt so replies can be parsed
/// into a message plus annotations.
const REPLY_FORMAT_INSTRUCTIONS: &str = "Respond with a single JSON object and nothing else, \
in the form {\"message\": string, \"sentiment\": string, \"intents\": [string]}. \
\"message\" is what you say to the user. \"sentiment\" is one lowercase word describing the \
user's latest message (positive, neutral, negative, or frustrated). \"intents\" lists short \
snake_case labels for what the user wants, for example \"billing\" or \"refund\"; use an \
empty list when nothing applies.";

/// Persona settings, loaded from `[agent.persona]`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentPersona {
    pub name: String,
    pub company: String,
    pub personality: String,
    /// Background the agent may draw on when answering.
    pub company_info: String,
    /// Behavioural rules, one per entry.
    pub guidelines: Vec<String>,
    pub greeting: String,
    /// Voice identifier passed to the speech backend.
    pub voice: String,
    /// Replaces the generated prompt body when set.
    pub system_prompt: Option<String>,
}

impl Default for AgentPersona {
    fn default() -> Self {
        Self {
            name: "Ava".to_string(),
            company: "Parlance".to_string(),
            personality: "warm, patient, and concise".to_string(),
            company_info: "Parlance answers customer questions about accounts, billing, \
                           orders, and technical issues."
                .to_string(),
            guidelines: vec![
                "Keep answers short enough to be spoken aloud".to_string(),
                "Ask a clarifying question when the request is ambiguous".to_string(),
                "Never invent account details you were not given".to_string(),
            ],
            greeting: "Hi, I'm Ava from Parlance. How can I help you today?".to_string(),
            voice: "alloy".to_string(),
            system_prompt: None,
        }
    }
}

impl AgentPersona {
    /// Builds the system prompt sent ahead of the conversation history.
    pub fn system_prompt(&self) -> String {
        let body = match self.system_prompt.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => custom.to_string(),
            _ => self.describe(),
        };
        format!("{}\n\n{}", body, REPLY_FORMAT_INSTRUCTIONS)
    }

    fn describe(&self) -> String {
        let mut prompt = format!(
            "You are {}, a customer care agent at {}. Your manner is {}.",
            self.name, self.company, self.personality
        );
        if !self.company_info.trim().is_empty() {
            prompt.push_str("\n\nAbout the company:\n");
            prompt.push_str(self.company_info.trim());
        }
        if !self.guidelines.is_empty() {
            prompt.push_str("\n\nGuidelines:");
            for rule in &self.guidelines {
                prompt.push_str("\n- ");
                prompt.push_str(rule);
            }
        }
        prompt
    }
}
