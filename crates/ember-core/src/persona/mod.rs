//! Personas: reusable system-prompt and sampling presets.

mod store;

pub use store::PersonaStore;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A persisted persona. `model` may be empty, meaning "use the caller's
/// model choice"; `id` is stable for the persona's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub model: String,
    pub system_message: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<u64>,
    #[serde(default = "default_icon")]
    pub icon: String,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> usize {
    512
}

fn default_top_p() -> f32 {
    0.9
}

fn default_icon() -> String {
    "🤖".to_string()
}

impl Persona {
    /// Fill in a generated id and the fallback tag when absent.
    pub fn ensure_defaults(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        if self.tags.is_empty() {
            self.tags = vec!["custom".to_string()];
        }
    }

    /// Check the fields required for persistence. The id doubles as a file
    /// name, so its character set is restricted at this boundary.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::PersonaValidation("name must not be empty".into()));
        }
        if self.system_message.trim().is_empty() {
            return Err(Error::PersonaValidation(
                "system_message must not be empty".into(),
            ));
        }
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::PersonaValidation(format!(
                "id '{}' contains unsupported characters",
                self.id
            )));
        }
        Ok(())
    }
}

/// The personas synthesized on first run, when the store directory holds no
/// persona files. All three leave `model` empty to follow the caller's
/// model choice.
pub fn default_personas() -> Vec<Persona> {
    vec![
        Persona {
            id: "assistant-default".to_string(),
            name: "Default Assistant".to_string(),
            model: String::new(),
            system_message: "I am a helpful, patient assistant. I seek to understand \
                             the person I am helping before answering, explain concepts \
                             with concrete examples, and keep my responses clear and \
                             encouraging. When intent is ambiguous I ask rather than \
                             assume."
                .to_string(),
            description: "General-purpose assistant with clear, helpful communication"
                .to_string(),
            voice: Some("glados".to_string()),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            tags: vec![
                "default".to_string(),
                "helpful".to_string(),
                "general".to_string(),
            ],
            created_at: None,
            icon: "🤖".to_string(),
        },
        Persona {
            id: "coder-expert".to_string(),
            name: "Code Expert".to_string(),
            model: String::new(),
            system_message: "I am a seasoned software engineer. I value readable, \
                             maintainable code over clever code, explain the why behind \
                             every recommendation, and include error handling and edge \
                             cases in my examples. I debug methodically: reproduce, \
                             isolate, fix, verify."
                .to_string(),
            description: "Programming assistant focused on clean, maintainable code"
                .to_string(),
            voice: Some("jarvis".to_string()),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            tags: vec![
                "coding".to_string(),
                "expert".to_string(),
                "technical".to_string(),
            ],
            created_at: None,
            icon: "👨‍💻".to_string(),
        },
        Persona {
            id: "creative-writer".to_string(),
            name: "Creative Writer".to_string(),
            model: String::new(),
            system_message: "I am a writer who sees stories everywhere. I favor vivid, \
                             sensory language, authentic characters, and meaningful \
                             conflict. I take creative risks, vary rhythm and pacing \
                             deliberately, and help others find the unexpected angle in \
                             their own ideas."
                .to_string(),
            description: "Creative writing assistant for storytelling and imagination"
                .to_string(),
            voice: Some("glados".to_string()),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            tags: vec![
                "creative".to_string(),
                "writing".to_string(),
                "storytelling".to_string(),
            ],
            created_at: None,
            icon: "✍️".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_requires_name_and_system_message() {
        let mut persona = default_personas().remove(0);
        assert!(persona.validate().is_ok());

        persona.name = "  ".to_string();
        assert!(matches!(
            persona.validate(),
            Err(Error::PersonaValidation(_))
        ));

        persona.name = "ok".to_string();
        persona.system_message = String::new();
        assert!(persona.validate().is_err());
    }

    #[test]
    fn empty_model_is_valid() {
        let persona = default_personas().remove(0);
        assert!(persona.model.is_empty());
        assert!(persona.validate().is_ok());
    }

    #[test]
    fn hostile_id_is_rejected() {
        let mut persona = default_personas().remove(0);
        persona.id = "../escape".to_string();
        assert!(persona.validate().is_err());
    }

    #[test]
    fn ensure_defaults_fills_id_and_tags() {
        let mut persona = Persona {
            id: String::new(),
            name: "p".to_string(),
            model: String::new(),
            system_message: "s".to_string(),
            description: String::new(),
            voice: None,
            temperature: 0.7,
            max_tokens: 512,
            top_p: 0.9,
            tags: vec![],
            created_at: None,
            icon: default_icon(),
        };

        persona.ensure_defaults();
        assert!(!persona.id.is_empty());
        assert_eq!(persona.tags, vec!["custom"]);
    }
}
