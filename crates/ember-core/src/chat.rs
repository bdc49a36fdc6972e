//! Chat message types and prompt construction.

use serde::{Deserialize, Serialize};

/// Marker strings that end the assistant's turn. Passed to the backend as
/// stop sequences so the model cannot continue the conversation past its
/// own turn.
pub const STOP_MARKERS: [&str; 2] = ["Human:", "System:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    Assistant,
    /// Unrecognized roles deserialize as `User`.
    #[serde(other)]
    User,
}

impl ChatRole {
    /// Label used in the formatted prompt.
    pub fn label(self) -> &'static str {
        match self {
            ChatRole::System => "System",
            ChatRole::User => "Human",
            ChatRole::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Render an ordered message list as a single text prompt.
///
/// Each message becomes `"{Label}: {content}"`, lines are joined with a
/// blank line, and a trailing `Assistant:` cue prompts the next turn.
/// Pure: equal inputs always produce byte-identical output.
pub fn format_prompt(messages: &[ChatMessage]) -> String {
    let mut parts: Vec<String> = messages
        .iter()
        .map(|message| format!("{}: {}", message.role.label(), message.content))
        .collect();
    parts.push("Assistant:".to_string());
    parts.join("\n\n")
}
