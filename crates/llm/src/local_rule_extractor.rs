//! LocalRuleExtractor (§4.5): deterministic fallback used when the agent is
//! disabled or fails. Never fails itself — worst case it returns an empty
//! delta — and never invents endpoints it cannot justify from the text.

use std::collections::HashMap;

use async_trait::async_trait;
use nm_domain::error::LlmError;
use regex::Regex;

use crate::delta::{Delta, DeletionType, EdgeDelete, NodeDelete, NodeUpdate};
use crate::update_agent::DeltaExtractor;

/// `[update: Name key=value, key2=value2]`
fn update_directive_re() -> Regex {
    Regex::new(r"(?i)\[update:\s*([^,\]]+?)(?:\s+([^\]]*))?\]").unwrap()
}

/// `[delete: Name type=death reason=text]`
fn delete_directive_re() -> Regex {
    Regex::new(r"(?i)\[delete:\s*([^,\]]+?)(?:\s+([^\]]*))?\]").unwrap()
}

/// `Name is now attribute` — a lightweight named-entity mood/state heuristic.
fn is_now_re() -> Regex {
    Regex::new(r"([A-Z][\w'-]*(?:\s[A-Z][\w'-]*)*) is now (\w[\w\s-]*)").unwrap()
}

fn parse_kv_pairs(s: &str) -> HashMap<String, nm_graph::AttributeValue> {
    let mut attrs = HashMap::new();
    for pair in s.split(|c| c == ',' || c == ' ') {
        if let Some((k, v)) = pair.split_once('=') {
            if !k.is_empty() && !v.is_empty() {
                attrs.insert(k.trim().to_string(), v.trim().into());
            }
        }
    }
    attrs
}

fn parse_deletion_type(s: &str) -> DeletionType {
    if s.contains("type=death") || s.contains("type=Death") {
        DeletionType::Death
    } else if s.contains("type=lost") || s.contains("type=Lost") {
        DeletionType::Lost
    } else {
        DeletionType::Default
    }
}

#[derive(Default)]
pub struct LocalRuleExtractor;

impl LocalRuleExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeltaExtractor for LocalRuleExtractor {
    async fn extract(
        &self,
        _user_text: &str,
        assistant_text: &str,
        _graph_snapshot: &str,
        _recent_context: &str,
    ) -> Result<Delta, LlmError> {
        let mut delta = Delta::default();

        for cap in update_directive_re().captures_iter(assistant_text) {
            let name = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if name.is_empty() {
                continue;
            }
            let attrs = cap.get(2).map(|m| parse_kv_pairs(m.as_str())).unwrap_or_default();
            delta.nodes_to_update.push(NodeUpdate {
                node_id: name.to_string(),
                r#type: None,
                attributes: attrs,
            });
        }

        for cap in delete_directive_re().captures_iter(assistant_text) {
            let name = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if name.is_empty() {
                continue;
            }
            let rest = cap.get(2).map(|m| m.as_str()).unwrap_or("");
            let reason = rest
                .split("reason=")
                .nth(1)
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| "local rule extractor delete directive".to_string());
            delta.nodes_to_delete.push(NodeDelete {
                node_id: name.to_string(),
                deletion_type: parse_deletion_type(rest),
                reason,
            });
        }

        for cap in is_now_re().captures_iter(assistant_text) {
            let name = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            let state = cap.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            if name.is_empty() || state.is_empty() {
                continue;
            }
            let mut attrs = HashMap::new();
            attrs.insert("mood".to_string(), state.into());
            delta.nodes_to_update.push(NodeUpdate {
                node_id: name.to_string(),
                r#type: None,
                attributes: attrs,
            });
        }

        // Explicit [delete: ...] wins over an [update: ...] for the same
        // name within one reply — drop the matching update.
        if !delta.nodes_to_delete.is_empty() {
            let deleted: std::collections::HashSet<_> =
                delta.nodes_to_delete.iter().map(|d| d.node_id.clone()).collect();
            delta.nodes_to_update.retain(|u| !deleted.contains(&u.node_id));
        }

        Ok(delta)
    }
}

/// Builds a wildcard edge-delete entry, exposed for callers that parse their
/// own directive syntax ahead of handing text to this extractor.
pub fn wildcard_edge_delete(node_id: &str, reason: &str) -> EdgeDelete {
    EdgeDelete {
        source: node_id.to_string(),
        target: "*".to_string(),
        relationship: "*".to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_directive_extracts_attributes() {
        let extractor = LocalRuleExtractor::new();
        let delta = extractor
            .extract("", "The tavern grows quiet. [update: Seraphina mood=wary]", "", "")
            .await
            .unwrap();
        assert_eq!(delta.nodes_to_update.len(), 1);
        assert_eq!(delta.nodes_to_update[0].node_id, "Seraphina");
        assert_eq!(
            delta.nodes_to_update[0].attributes.get("mood"),
            Some(&nm_graph::AttributeValue::String("wary".into()))
        );
    }

    #[tokio::test]
    async fn delete_directive_sets_deletion_type() {
        let extractor = LocalRuleExtractor::new();
        let delta = extractor
            .extract("", "[delete: Old Guard type=death reason=slain in the brawl]", "", "")
            .await
            .unwrap();
        assert_eq!(delta.nodes_to_delete.len(), 1);
        assert_eq!(delta.nodes_to_delete[0].deletion_type, DeletionType::Death);
        assert!(delta.nodes_to_delete[0].reason.contains("slain"));
    }

    #[tokio::test]
    async fn is_now_heuristic_sets_mood() {
        let extractor = LocalRuleExtractor::new();
        let delta = extractor
            .extract("", "Seraphina is now furious.", "", "")
            .await
            .unwrap();
        assert_eq!(delta.nodes_to_update.len(), 1);
        assert_eq!(delta.nodes_to_update[0].node_id, "Seraphina");
    }

    #[tokio::test]
    async fn plain_text_yields_empty_delta() {
        let extractor = LocalRuleExtractor::new();
        let delta = extractor
            .extract("", "Nothing of note happens.", "", "")
            .await
            .unwrap();
        assert!(delta.nodes_to_update.is_empty());
        assert!(delta.nodes_to_delete.is_empty());
        assert!(delta.edges_to_add.is_empty());
    }

    #[tokio::test]
    async fn delete_suppresses_conflicting_update() {
        let extractor = LocalRuleExtractor::new();
        let delta = extractor
            .extract(
                "",
                "[update: Seraphina mood=wary] [delete: Seraphina type=lost reason=left town]",
                "",
                "",
            )
            .await
            .unwrap();
        assert_eq!(delta.nodes_to_update.len(), 0);
        assert_eq!(delta.nodes_to_delete.len(), 1);
    }
}
