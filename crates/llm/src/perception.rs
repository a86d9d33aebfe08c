//! PerceptionExtractor: entity/intent detection over free text given a
//! graph, used by `enhance_prompt` as a cheap fallback path that needs no
//! LLM round-trip.

use nm_graph::KnowledgeGraph;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerceptionStats {
    pub candidates_scanned: usize,
    pub matches_found: usize,
}

pub struct PerceptionExtractor;

impl PerceptionExtractor {
    /// Case-insensitive substring match of every live entity's display name
    /// against `text`. Returns matching entity ids, longest-name-first so a
    /// multi-word name is preferred over a shorter substring of it.
    pub fn detect_entities(text: &str, graph: &KnowledgeGraph) -> (Vec<String>, PerceptionStats) {
        let haystack = text.to_lowercase();
        let mut candidates: Vec<(&str, &str)> = graph
            .nodes()
            .filter(|e| !e.is_deleted)
            .map(|e| (e.id.as_str(), e.name.as_str()))
            .collect();
        candidates.sort_by_key(|(_, name)| std::cmp::Reverse(name.len()));

        let mut found = Vec::new();
        let mut stats = PerceptionStats {
            candidates_scanned: candidates.len(),
            matches_found: 0,
        };

        for (id, name) in candidates {
            if haystack.contains(&name.to_lowercase()) {
                found.push(id.to_string());
                stats.matches_found += 1;
            }
        }

        (found, stats)
    }
}
