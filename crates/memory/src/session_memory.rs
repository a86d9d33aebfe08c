use std::path::Path;

use chrono::{DateTime, Utc};
use nm_domain::error::Result;
use nm_graph::{AttributeMap, Entity, KnowledgeGraph};
use serde::{Deserialize, Serialize};

/// One conversational turn as remembered by [`SessionMemory`] (distinct from
/// `nm_window::Turn`, which additionally tracks extraction bookkeeping).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

/// On-disk entities mirror (§6.3), consumed by external viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesMirror {
    pub entities: Vec<MirrorEntity>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: String,
    pub created_time: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub attributes: AttributeMap,
}

impl From<&Entity> for MirrorEntity {
    fn from(e: &Entity) -> Self {
        Self {
            name: e.name.clone(),
            entity_type: e.entity_type.as_str().to_string(),
            description: e.description.clone(),
            created_time: e.created_time,
            last_modified: e.last_modified,
            attributes: e.attributes.clone(),
        }
    }
}

/// Wraps a [`KnowledgeGraph`] + rolling conversation log + key-value state
/// for one session.
pub struct SessionMemory {
    pub graph: KnowledgeGraph,
    conversation_log: Vec<ConversationEntry>,
    state: std::collections::HashMap<String, serde_json::Value>,
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMemory {
    pub fn new() -> Self {
        Self {
            graph: KnowledgeGraph::new(),
            conversation_log: Vec::new(),
            state: std::collections::HashMap::new(),
        }
    }

    /// Appends a turn; unbounded until an explicit reset (§4.2 default).
    pub fn add_conversation(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.conversation_log.push(ConversationEntry {
            user: user.into(),
            assistant: assistant.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn conversation_log(&self) -> &[ConversationEntry] {
        &self.conversation_log
    }

    pub fn clear_conversation_log(&mut self) {
        self.conversation_log.clear();
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.state.insert(key.into(), value);
    }

    pub fn get_state(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }

    /// Combines (a) descriptions and 1-hop neighborhoods of `entity_ids` and
    /// (b) the last `recent_turns` conversation entries into a text block.
    /// Truncation to a caller-supplied byte budget happens upstream.
    pub fn retrieve_context_for_prompt(&self, entity_ids: &[String], recent_turns: usize) -> String {
        let mut out = String::new();

        for eid in entity_ids {
            let Some(entity) = self.graph.get_node(eid) else {
                continue;
            };
            if entity.is_deleted {
                continue;
            }
            out.push_str(&format!("- {} ({}): {}\n", entity.name, entity.entity_type.as_str(), entity.description));
            for (rel, other) in self.graph.neighborhood(eid) {
                if let Some(other) = other {
                    if other.is_deleted {
                        continue;
                    }
                    let (verb, target_name) = if rel.source_id == *eid {
                        (rel.relationship.as_str(), other.name.as_str())
                    } else {
                        (rel.relationship.as_str(), other.name.as_str())
                    };
                    out.push_str(&format!("  · {verb} {target_name}\n"));
                }
            }
        }

        if recent_turns > 0 && !self.conversation_log.is_empty() {
            out.push_str("\nRecent conversation:\n");
            let start = self.conversation_log.len().saturating_sub(recent_turns);
            for entry in &self.conversation_log[start..] {
                out.push_str(&format!("User: {}\nAssistant: {}\n", entry.user, entry.assistant));
            }
        }

        out
    }

    /// Writes a JSON mirror (§6.3) of the entity table for external tooling.
    pub fn sync_entities_to_disk(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mirror = EntitiesMirror {
            entities: self.graph.nodes().map(MirrorEntity::from).collect(),
            last_modified: Utc::now(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&mirror)?)?;
        Ok(())
    }

    /// Restores from the same mirror, overwriting in-memory entity state
    /// (relations are not part of the mirror and are left untouched).
    pub fn reload_entities_from_disk(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)?;
        let mirror: EntitiesMirror = serde_json::from_str(&raw)?;
        self.graph.clear();
        for me in mirror.entities {
            let entity_type: nm_graph::EntityType = me.entity_type.parse().unwrap_or(nm_graph::EntityType::Unknown);
            let id = nm_graph::canonical_id(entity_type, &me.name);
            self.graph
                .add_or_update_node(id, entity_type, me.name, Some(me.description), me.attributes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nm_graph::EntityType;

    #[test]
    fn retrieve_context_includes_neighborhood_and_recent_turns() {
        let mut mem = SessionMemory::new();
        let a = nm_graph::canonical_id(EntityType::Character, "Seraphina");
        let b = nm_graph::canonical_id(EntityType::Location, "Tavern");
        mem.graph
            .add_or_update_node(a.clone(), EntityType::Character, "Seraphina", Some("a rogue".into()), AttributeMap::new());
        mem.graph
            .add_or_update_node(b.clone(), EntityType::Location, "Tavern", None, AttributeMap::new());
        mem.graph.add_edge(a.clone(), b, "located_in", AttributeMap::new()).unwrap();
        mem.add_conversation("hello", "hi there");

        let ctx = mem.retrieve_context_for_prompt(&[a], 1);
        assert!(ctx.contains("Seraphina"));
        assert!(ctx.contains("located_in"));
        assert!(ctx.contains("hello"));
    }

    #[test]
    fn entities_mirror_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");

        let mut mem = SessionMemory::new();
        let a = nm_graph::canonical_id(EntityType::Character, "Seraphina");
        mem.graph
            .add_or_update_node(a.clone(), EntityType::Character, "Seraphina", Some("a rogue".into()), AttributeMap::new());
        mem.sync_entities_to_disk(&path).unwrap();

        let mut mem2 = SessionMemory::new();
        mem2.reload_entities_from_disk(&path).unwrap();
        assert_eq!(mem2.graph.len_nodes(), 1);
        assert_eq!(mem2.graph.get_node(&a).unwrap().description, "a rogue");
    }

    #[test]
    fn deleted_entities_excluded_from_context() {
        let mut mem = SessionMemory::new();
        let a = nm_graph::canonical_id(EntityType::Character, "Ghost");
        mem.graph
            .add_or_update_node(a.clone(), EntityType::Character, "Ghost", Some("spooky".into()), AttributeMap::new());
        mem.graph.mark_node_deleted(&a, "died");
        let ctx = mem.retrieve_context_for_prompt(&[a], 0);
        assert!(!ctx.contains("spooky"));
    }
}
