use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use nm_domain::error::{GraphError, Result};
use serde::{Deserialize, Serialize};

use crate::entity::{AttributeMap, Entity, EntityType};
use crate::relation::Relation;

const FORMAT_VERSION: u32 = 1;

/// On-disk shape of a graph file (§6.3). Round-trip loss-free: `save`
/// followed by `load` yields an identical graph by structural equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphFile {
    format_version: u32,
    nodes: Vec<Entity>,
    edges: Vec<Relation>,
}

/// A typed directed multigraph of entities and relations, scoped to one
/// session.
#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    nodes: HashMap<String, Entity>,
    edges: Vec<Relation>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn len_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn get_node(&self, id: &str) -> Option<&Entity> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Entity> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Relation> {
        self.edges.iter()
    }

    /// Upserts a node by canonical id. Preserves attributes not present in
    /// `attrs` and updates `last_modified`.
    pub fn add_or_update_node(
        &mut self,
        id: impl Into<String>,
        entity_type: EntityType,
        name: impl Into<String>,
        description: Option<String>,
        attrs: AttributeMap,
    ) -> &Entity {
        let id = id.into();
        let now = Utc::now();
        let entry = self.nodes.entry(id.clone()).or_insert_with(|| Entity {
            id: id.clone(),
            entity_type,
            name: name.into(),
            description: String::new(),
            attributes: AttributeMap::new(),
            is_deleted: false,
            deletion_reason: None,
            created_time: now,
            last_modified: now,
        });
        if let Some(desc) = description {
            entry.description = desc;
        }
        for (k, v) in attrs {
            entry.attributes.insert(k, v);
        }
        entry.last_modified = now;
        &self.nodes[&id]
    }

    /// Fails with [`GraphError::MissingEndpoint`] if either node is absent
    /// (§9 open question resolved in favor of failing loudly — see DESIGN.md).
    pub fn add_edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        relationship: impl Into<String>,
        attrs: AttributeMap,
    ) -> Result<()> {
        let source = source.into();
        let target = target.into();
        let relationship = relationship.into();

        if !self.nodes.contains_key(&source) {
            return Err(GraphError::MissingEndpoint(source).into());
        }
        if !self.nodes.contains_key(&target) {
            return Err(GraphError::MissingEndpoint(target).into());
        }

        if let Some(existing) = self
            .edges
            .iter_mut()
            .find(|e| e.source_id == source && e.target_id == target && e.relationship == relationship)
        {
            existing.attributes.extend(attrs);
        } else {
            let mut rel = Relation::new(source, target, relationship);
            rel.attributes = attrs;
            self.edges.push(rel);
        }
        Ok(())
    }

    /// Removes the node and all incident edges. Returns whether it existed.
    pub fn delete_node(&mut self, id: &str) -> bool {
        let existed = self.nodes.remove(id).is_some();
        if existed {
            self.edges.retain(|e| e.source_id != id && e.target_id != id);
        }
        existed
    }

    /// Soft-delete: the node stays queryable but is excluded from context
    /// retrieval by default.
    pub fn mark_node_deleted(&mut self, id: &str, reason: impl Into<String>) -> bool {
        if let Some(entity) = self.nodes.get_mut(id) {
            entity.is_deleted = true;
            entity.deletion_reason = Some(reason.into());
            entity.last_modified = Utc::now();
            true
        } else {
            false
        }
    }

    /// Precise or wildcard (`"*"`) edge deletion. Returns the number removed.
    pub fn delete_edge(&mut self, source: &str, target: &str, relationship: &str) -> usize {
        let before = self.edges.len();
        self.edges
            .retain(|e| !e.matches_pattern(source, target, relationship));
        before - self.edges.len()
    }

    /// Empties nodes and edges; preserves the format version.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    /// One-hop neighborhood of `id`: outgoing and incoming edges plus the
    /// entities at their other end, excluding hard-deleted entities.
    pub fn neighborhood(&self, id: &str) -> Vec<(&Relation, Option<&Entity>)> {
        self.edges
            .iter()
            .filter(|e| e.source_id == id || e.target_id == id)
            .map(|e| {
                let other = if e.source_id == id {
                    &e.target_id
                } else {
                    &e.source_id
                };
                (e, self.nodes.get(other))
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = GraphFile {
            format_version: FORMAT_VERSION,
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), nodes = file.nodes.len(), edges = file.edges.len(), "graph saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: GraphFile = serde_json::from_str(&raw)?;
        let nodes = file.nodes.into_iter().map(|e| (e.id.clone(), e)).collect();
        Ok(Self {
            nodes,
            edges: file.edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{canonical_id, AttributeValue};

    fn id(t: EntityType, name: &str) -> String {
        canonical_id(t, name)
    }

    #[test]
    fn canonical_id_normalizes_name() {
        assert_eq!(id(EntityType::Character, "Lady Seraphina"), "character_lady_seraphina");
    }

    #[test]
    fn add_or_update_node_preserves_unspecified_attributes() {
        let mut g = KnowledgeGraph::new();
        let nid = id(EntityType::Character, "Seraphina");
        let mut attrs = AttributeMap::new();
        attrs.insert("mood".into(), "happy".into());
        g.add_or_update_node(nid.clone(), EntityType::Character, "Seraphina", None, attrs);

        let mut attrs2 = AttributeMap::new();
        attrs2.insert("location".into(), "tavern".into());
        g.add_or_update_node(nid.clone(), EntityType::Character, "Seraphina", None, attrs2);

        let node = g.get_node(&nid).unwrap();
        assert_eq!(node.attributes.get("mood").unwrap(), &AttributeValue::String("happy".into()));
        assert_eq!(node.attributes.get("location").unwrap(), &AttributeValue::String("tavern".into()));
    }

    #[test]
    fn add_edge_fails_on_missing_endpoint() {
        let mut g = KnowledgeGraph::new();
        let a = id(EntityType::Character, "A");
        g.add_or_update_node(a.clone(), EntityType::Character, "A", None, AttributeMap::new());
        let err = g.add_edge(a, "character_ghost", "friend_of", AttributeMap::new());
        assert!(err.is_err());
    }

    #[test]
    fn delete_node_removes_incident_edges() {
        let mut g = KnowledgeGraph::new();
        let a = id(EntityType::Character, "A");
        let b = id(EntityType::Character, "B");
        g.add_or_update_node(a.clone(), EntityType::Character, "A", None, AttributeMap::new());
        g.add_or_update_node(b.clone(), EntityType::Character, "B", None, AttributeMap::new());
        g.add_edge(a.clone(), b.clone(), "friend_of", AttributeMap::new()).unwrap();

        assert!(g.delete_node(&a));
        assert_eq!(g.len_edges(), 0);
        assert!(!g.delete_node(&a)); // already gone
    }

    #[test]
    fn mark_node_deleted_is_soft() {
        let mut g = KnowledgeGraph::new();
        let a = id(EntityType::Character, "A");
        g.add_or_update_node(a.clone(), EntityType::Character, "A", None, AttributeMap::new());
        assert!(g.mark_node_deleted(&a, "slain"));
        let node = g.get_node(&a).unwrap();
        assert!(node.is_deleted);
        assert_eq!(node.deletion_reason.as_deref(), Some("slain"));
    }

    #[test]
    fn delete_edge_wildcard_matches_all() {
        let mut g = KnowledgeGraph::new();
        let a = id(EntityType::Character, "A");
        let b = id(EntityType::Character, "B");
        let c = id(EntityType::Character, "C");
        for n in [&a, &b, &c] {
            g.add_or_update_node(n.clone(), EntityType::Character, n.clone(), None, AttributeMap::new());
        }
        g.add_edge(a.clone(), b.clone(), "friend_of", AttributeMap::new()).unwrap();
        g.add_edge(a.clone(), c.clone(), "enemy_of", AttributeMap::new()).unwrap();

        let removed = g.delete_edge(&a, "*", "*");
        assert_eq!(removed, 2);
        assert_eq!(g.len_edges(), 0);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let mut g = KnowledgeGraph::new();
        let a = id(EntityType::Character, "A");
        let b = id(EntityType::Location, "Tavern");
        g.add_or_update_node(a.clone(), EntityType::Character, "A", Some("a hero".into()), AttributeMap::new());
        g.add_or_update_node(b.clone(), EntityType::Location, "Tavern", None, AttributeMap::new());
        g.add_edge(a.clone(), b.clone(), "located_in", AttributeMap::new()).unwrap();

        g.save(&path).unwrap();
        let loaded = KnowledgeGraph::load(&path).unwrap();

        assert_eq!(loaded.len_nodes(), g.len_nodes());
        assert_eq!(loaded.len_edges(), g.len_edges());
        assert_eq!(loaded.get_node(&a).unwrap().description, "a hero");
    }

    #[test]
    fn clear_empties_graph() {
        let mut g = KnowledgeGraph::new();
        let a = id(EntityType::Character, "A");
        g.add_or_update_node(a, EntityType::Character, "A", None, AttributeMap::new());
        g.clear();
        assert_eq!(g.len_nodes(), 0);
        assert_eq!(g.len_edges(), 0);
    }
}
