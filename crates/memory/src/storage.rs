//! Per-character directory layout and character-mapping registry (§4.10).
//!
//! Mirrors the load-or-create JSON-file pattern used for the gateway's
//! session store: a single registry file under `state_root`, guarded by a
//! `RwLock`, flushed on every mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nm_domain::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One registered character-to-session mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterEntry {
    pub character_mapping_key: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Registry {
    characters: HashMap<String, CharacterEntry>,
}

/// Owns `<state_root>/characters/registry.json` plus the per-session and
/// per-character directory layout (`<state_root>/sessions/<id>/`,
/// `<state_root>/test/<id>/`).
pub struct StorageManager {
    state_root: PathBuf,
    registry_path: PathBuf,
    registry: RwLock<Registry>,
}

impl StorageManager {
    pub fn new(state_root: impl Into<PathBuf>) -> Result<Self> {
        let state_root = state_root.into();
        let dir = state_root.join("characters");
        std::fs::create_dir_all(&dir)?;

        let registry_path = dir.join("registry.json");
        let registry = if registry_path.exists() {
            let raw = std::fs::read_to_string(&registry_path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            Registry::default()
        };

        tracing::info!(
            characters = registry.characters.len(),
            path = %registry_path.display(),
            "storage manager loaded"
        );

        Ok(Self {
            state_root,
            registry_path,
            registry: RwLock::new(registry),
        })
    }

    fn flush(&self) -> Result<()> {
        let registry = self.registry.read();
        let json = serde_json::to_string_pretty(&*registry)
            .map_err(|e| Error::Other(format!("serializing character registry: {e}")))?;
        std::fs::write(&self.registry_path, json)?;
        Ok(())
    }

    /// Registers `character_mapping_key`, minting a fresh session id if the
    /// key is unseen; otherwise returns the existing mapping unchanged.
    pub fn register_character(&self, character_mapping_key: &str) -> Result<CharacterEntry> {
        {
            let registry = self.registry.read();
            if let Some(entry) = registry.characters.get(character_mapping_key) {
                return Ok(entry.clone());
            }
        }
        let entry = self.create_new_session(character_mapping_key)?;
        Ok(entry)
    }

    /// Mints a new session id for `character_mapping_key`, overwriting any
    /// prior mapping for that key.
    pub fn create_new_session(&self, character_mapping_key: &str) -> Result<CharacterEntry> {
        let now = Utc::now();
        let entry = CharacterEntry {
            character_mapping_key: character_mapping_key.to_owned(),
            session_id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
        };
        {
            let mut registry = self.registry.write();
            registry
                .characters
                .insert(character_mapping_key.to_owned(), entry.clone());
        }
        self.flush()?;
        Ok(entry)
    }

    pub fn get_session_info(&self, character_mapping_key: &str) -> Option<CharacterEntry> {
        self.registry.read().characters.get(character_mapping_key).cloned()
    }

    pub fn list_characters(&self) -> Vec<String> {
        self.registry.read().characters.keys().cloned().collect()
    }

    pub fn list_sessions(&self) -> Vec<CharacterEntry> {
        self.registry.read().characters.values().cloned().collect()
    }

    /// Directory holding a session's graph + entities mirror + conversation
    /// log. `is_test` sessions live under a separate subtree so they can be
    /// wiped independently of real play data.
    pub fn session_dir(&self, session_id: &str, is_test: bool) -> PathBuf {
        if is_test {
            self.state_root.join("test").join(session_id)
        } else {
            self.state_root.join("sessions").join(session_id)
        }
    }

    pub fn get_graph_path(&self, session_id: &str, is_test: bool) -> PathBuf {
        self.session_dir(session_id, is_test).join("graph.json")
    }

    pub fn get_entities_mirror_path(&self, session_id: &str, is_test: bool) -> PathBuf {
        self.session_dir(session_id, is_test).join("entities.json")
    }

    /// Deletes every `test/` session directory. Does not touch the registry.
    pub fn clear_test_data(&self) -> Result<()> {
        let test_dir = self.state_root.join("test");
        if test_dir.exists() {
            std::fs::remove_dir_all(&test_dir)?;
        }
        Ok(())
    }

    /// Removes a character's registry entry and its session directory.
    pub fn clear_character_data(&self, character_mapping_key: &str) -> Result<()> {
        let entry = {
            let mut registry = self.registry.write();
            registry.characters.remove(character_mapping_key)
        };
        if let Some(entry) = entry {
            let dir = self.session_dir(&entry.session_id, false);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
        }
        self.flush()
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_character_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = StorageManager::new(dir.path()).unwrap();

        let first = mgr.register_character("tavern::seraphina").unwrap();
        let second = mgr.register_character("tavern::seraphina").unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    #[test]
    fn create_new_session_rotates_session_id() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = StorageManager::new(dir.path()).unwrap();

        let first = mgr.register_character("tavern::seraphina").unwrap();
        let rotated = mgr.create_new_session("tavern::seraphina").unwrap();
        assert_ne!(first.session_id, rotated.session_id);
    }

    #[test]
    fn clear_character_data_removes_registry_entry_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = StorageManager::new(dir.path()).unwrap();
        let entry = mgr.register_character("tavern::seraphina").unwrap();

        let session_dir = mgr.session_dir(&entry.session_id, false);
        std::fs::create_dir_all(&session_dir).unwrap();
        assert!(session_dir.exists());

        mgr.clear_character_data("tavern::seraphina").unwrap();
        assert!(mgr.get_session_info("tavern::seraphina").is_none());
        assert!(!session_dir.exists());
    }

    #[test]
    fn registry_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mgr = StorageManager::new(dir.path()).unwrap();
            mgr.register_character("tavern::seraphina").unwrap();
        }
        let reopened = StorageManager::new(dir.path()).unwrap();
        assert_eq!(reopened.list_characters(), vec!["tavern::seraphina".to_string()]);
    }
}
