//! ValidationLayer (§4.6): filters a proposed delta against the current
//! graph before it is ever applied. Never fails — a malformed delta just
//! yields a smaller cleaned delta plus counters explaining what was dropped.

use std::collections::HashSet;

use nm_graph::{canonical_id, EntityType, KnowledgeGraph};

use crate::delta::{Delta, EdgeAdd};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationCounters {
    pub edges_dropped_missing_endpoint: usize,
    pub duplicates_dropped: usize,
    pub ids_normalized: usize,
}

pub struct ValidationLayer;

impl ValidationLayer {
    /// Infers an entity type from attribute shape when the extractor left
    /// `type` unset (§4.6: "presence of a `location` attribute → character").
    fn infer_type(attrs_has_location: bool) -> EntityType {
        if attrs_has_location {
            EntityType::Character
        } else {
            EntityType::Unknown
        }
    }

    /// Returns `true` if `raw` already looks like `<type>_<name>` with a
    /// recognized type prefix, i.e. it is already a canonical id and must
    /// not be re-prefixed.
    fn looks_canonical(raw: &str) -> bool {
        raw.split_once('_')
            .map(|(prefix, _)| prefix.parse::<EntityType>().map(|t| t.as_str() == prefix).unwrap_or(false))
            .unwrap_or(false)
    }

    fn canonicalize_id(raw: &str, declared_type: Option<&str>, has_location_attr: bool) -> String {
        if Self::looks_canonical(raw) {
            return raw.to_string();
        }
        if let Some(t) = declared_type.and_then(|t| t.parse::<EntityType>().ok()) {
            return canonical_id(t, raw);
        }
        canonical_id(Self::infer_type(has_location_attr), raw)
    }

    /// Validates `delta` against `graph`, returning the cleaned delta and
    /// counters describing what was dropped or normalized.
    pub fn validate(delta: Delta, graph: &KnowledgeGraph) -> (Delta, ValidationCounters) {
        let mut counters = ValidationCounters::default();
        let mut cleaned = Delta::default();

        let mut created_ids: HashSet<String> = HashSet::new();
        let mut seen_updates: HashSet<String> = HashSet::new();
        // Maps the raw (pre-canonicalization) name used in this delta's own
        // nodes_to_update to its resolved canonical id, so edges_to_add can
        // reference endpoints by the same name the delta created them under.
        let mut raw_to_canonical: std::collections::HashMap<String, String> = std::collections::HashMap::new();

        for mut update in delta.nodes_to_update {
            let has_location = update.attributes.contains_key("location");
            let canonical = Self::canonicalize_id(&update.node_id, update.r#type.as_deref(), has_location);
            if canonical != update.node_id {
                counters.ids_normalized += 1;
            }
            raw_to_canonical.insert(update.node_id.clone(), canonical.clone());
            update.node_id = canonical.clone();

            if !seen_updates.insert(canonical.clone()) {
                counters.duplicates_dropped += 1;
                continue;
            }
            created_ids.insert(canonical);
            cleaned.nodes_to_update.push(update);
        }

        let mut seen_edges: HashSet<(String, String, String)> = HashSet::new();
        for edge in delta.edges_to_add {
            let source = raw_to_canonical
                .get(&edge.source)
                .cloned()
                .unwrap_or_else(|| Self::canonicalize_id(&edge.source, None, false));
            let target = raw_to_canonical
                .get(&edge.target)
                .cloned()
                .unwrap_or_else(|| Self::canonicalize_id(&edge.target, None, false));
            let key = (source.clone(), target.clone(), edge.relationship.clone());

            if !seen_edges.insert(key) {
                counters.duplicates_dropped += 1;
                continue;
            }

            let source_exists = created_ids.contains(&source) || graph.get_node(&source).is_some();
            let target_exists = created_ids.contains(&target) || graph.get_node(&target).is_some();
            if !source_exists || !target_exists {
                counters.edges_dropped_missing_endpoint += 1;
                continue;
            }

            cleaned.edges_to_add.push(EdgeAdd {
                source,
                target,
                relationship: edge.relationship,
            });
        }

        let mut seen_deletes: HashSet<String> = HashSet::new();
        for mut delete in delta.nodes_to_delete {
            let canonical = Self::canonicalize_id(&delete.node_id, None, false);
            delete.node_id = canonical.clone();
            if !seen_deletes.insert(canonical) {
                counters.duplicates_dropped += 1;
                continue;
            }
            cleaned.nodes_to_delete.push(delete);
        }

        let mut seen_edge_deletes: HashSet<(String, String, String)> = HashSet::new();
        for edge_delete in delta.edges_to_delete {
            let key = (
                edge_delete.source.clone(),
                edge_delete.target.clone(),
                edge_delete.relationship.clone(),
            );
            if !seen_edge_deletes.insert(key) {
                counters.duplicates_dropped += 1;
                continue;
            }
            cleaned.edges_to_delete.push(edge_delete);
        }

        (cleaned, counters)
    }
}
