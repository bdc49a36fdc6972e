//! File-backed persona storage: one JSON file per persona id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{default_personas, Persona};
use crate::error::Result;

pub struct PersonaStore {
    dir: PathBuf,
    personas: RwLock<HashMap<String, Persona>>,
}

impl PersonaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            personas: RwLock::new(HashMap::new()),
        }
    }

    /// Load all personas from disk, synthesizing the defaults when the
    /// directory holds none. Unreadable files are logged and skipped.
    pub async fn load(&self) -> Result<usize> {
        std::fs::create_dir_all(&self.dir)?;

        let mut loaded: HashMap<String, Persona> = HashMap::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Persona>(&raw).map_err(|e| e.to_string()))
            {
                Ok(persona) => {
                    loaded.insert(persona.id.clone(), persona);
                }
                Err(err) => warn!("Skipping persona file {}: {}", path.display(), err),
            }
        }

        let needs_defaults = loaded.is_empty();
        {
            let mut personas = self.personas.write().await;
            *personas = loaded;
        }

        if needs_defaults {
            info!("No personas found; creating defaults");
            for persona in default_personas() {
                if self.save(persona).await.is_none() {
                    warn!("Failed to persist a default persona");
                }
            }
        }

        let count = self.personas.read().await.len();
        info!("Persona store ready: {} personas", count);
        Ok(count)
    }

    pub async fn get(&self, id: &str) -> Option<Persona> {
        self.personas.read().await.get(id).cloned()
    }

    /// All personas, sorted by name for stable listings.
    pub async fn list(&self) -> Vec<Persona> {
        let mut all: Vec<Persona> = self.personas.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Persist a persona. Validation failure or an I/O error blocks the
    /// save and returns None; on success the stored persona (with generated
    /// id and timestamp) is returned.
    pub async fn save(&self, mut persona: Persona) -> Option<Persona> {
        persona.ensure_defaults();
        if let Err(err) = persona.validate() {
            warn!("Rejected persona '{}': {}", persona.name, err);
            return None;
        }
        if persona.created_at.is_none() {
            persona.created_at = Some(now_unix_secs());
        }

        let path = self.dir.join(format!("{}.json", persona.id));
        let json = match serde_json::to_string_pretty(&persona) {
            Ok(json) => json,
            Err(err) => {
                warn!("Failed to serialize persona '{}': {}", persona.id, err);
                return None;
            }
        };
        if let Err(err) = std::fs::write(&path, json) {
            warn!("Failed to write persona file {}: {}", path.display(), err);
            return None;
        }

        self.personas
            .write()
            .await
            .insert(persona.id.clone(), persona.clone());
        Some(persona)
    }

    /// Remove a persona from memory and disk. Returns false when the id is
    /// unknown, leaving the store unchanged.
    pub async fn delete(&self, id: &str) -> bool {
        let mut personas = self.personas.write().await;
        if personas.remove(id).is_none() {
            return false;
        }
        drop(personas);

        let path = self.dir.join(format!("{id}.json"));
        if path.exists() {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("Failed to remove persona file {}: {}", path.display(), err);
            }
        }
        true
    }
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_persona(id: &str) -> Persona {
        Persona {
            id: id.to_string(),
            name: "Sample".to_string(),
            model: "tinymodel".to_string(),
            system_message: "Be concise.".to_string(),
            description: String::new(),
            voice: None,
            temperature: 0.5,
            max_tokens: 128,
            top_p: 0.9,
            tags: vec![],
            created_at: None,
            icon: "🤖".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_dir_synthesizes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStore::new(dir.path());

        let count = store.load().await.unwrap();
        assert_eq!(count, 3);
        assert!(store.get("assistant-default").await.is_some());

        // The defaults were persisted, so a fresh store sees them too.
        let reopened = PersonaStore::new(dir.path());
        assert_eq!(reopened.load().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn save_assigns_id_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStore::new(dir.path());
        store.load().await.unwrap();

        let mut persona = sample_persona("");
        persona.id = String::new();
        let saved = store.save(persona).await.expect("save should succeed");

        assert!(!saved.id.is_empty());
        assert!(saved.created_at.is_some());
        assert_eq!(saved.tags, vec!["custom"]);
        assert!(dir.path().join(format!("{}.json", saved.id)).exists());
    }

    #[tokio::test]
    async fn invalid_persona_blocks_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStore::new(dir.path());
        store.load().await.unwrap();

        let mut persona = sample_persona("bad");
        persona.system_message = String::new();
        assert!(store.save(persona).await.is_none());
        assert!(store.get("bad").await.is_none());
        assert!(!dir.path().join("bad.json").exists());
    }

    #[tokio::test]
    async fn delete_removes_entry_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStore::new(dir.path());
        store.load().await.unwrap();
        store.save(sample_persona("doomed")).await.unwrap();

        assert!(store.delete("doomed").await);
        assert!(store.get("doomed").await.is_none());
        assert!(!dir.path().join("doomed.json").exists());
    }

    #[tokio::test]
    async fn delete_unknown_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonaStore::new(dir.path());
        store.load().await.unwrap();

        let before = store.list().await.len();
        assert!(!store.delete("nope").await);
        assert_eq!(store.list().await.len(), before);
    }
}
