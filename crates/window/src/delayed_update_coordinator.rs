//! DelayedUpdateCoordinator (§4.8): the windowed turn-processing pipeline.

use std::path::Path;
use std::sync::Arc;

use nm_domain::error::Result;
use nm_graph::{AttributeMap, EntityType, KnowledgeGraph};
use nm_llm::{Delta, DeletionType, DeltaExtractor, LocalRuleExtractor, ValidationLayer};
use nm_memory::SessionMemory;
use parking_lot::Mutex;

use crate::conflict_resolver::{AuthoritativeTurn, ConflictResolver, SyncCounters};
use crate::extraction_lock::ExtractionLock;
use crate::sliding_window::{SlidingWindow, WindowInfo};
use crate::turn::Turn;

/// Counts of graph mutations applied by one extraction (§4.8 step 6).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphUpdateCounts {
    pub nodes_updated: usize,
    pub edges_added: usize,
    pub nodes_deleted: usize,
    pub edges_deleted: usize,
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub new_sequence: u64,
    pub target_processed: bool,
    pub window_info: WindowInfo,
    pub graph_updates: GraphUpdateCounts,
}

/// Splits a canonical id (`<type>_<name>`) back into its type and a
/// human-readable display name, for nodes the validator has already
/// normalized and for which the original display casing is no longer
/// available.
fn split_canonical(id: &str) -> (EntityType, String) {
    match id.split_once('_') {
        Some((prefix, rest)) if prefix.parse::<EntityType>().map(|t| t.as_str() == prefix).unwrap_or(false) => {
            (prefix.parse().unwrap_or(EntityType::Unknown), rest.replace('_', " "))
        }
        _ => (EntityType::Unknown, id.replace('_', " ")),
    }
}

/// Renders the live (non-deleted) nodes of `graph` as a short text block fed
/// to the extractor as context (§4.8 step 3). Shared with the single-shot
/// `extract_updates_from_response` path in `nm-session`.
pub fn graph_snapshot(graph: &KnowledgeGraph) -> String {
    let mut out = String::new();
    for entity in graph.nodes().filter(|e| !e.is_deleted) {
        out.push_str(&format!("- {} ({}): {}\n", entity.id, entity.entity_type.as_str(), entity.description));
    }
    out
}

/// Applies a validated delta to `graph`, returning mutation counts. Shared
/// with the single-shot `extract_updates_from_response` path in `nm-session`.
pub fn apply_delta(graph: &mut KnowledgeGraph, delta: &Delta) -> GraphUpdateCounts {
    let mut counts = GraphUpdateCounts::default();

    for update in &delta.nodes_to_update {
        let (inferred_type, display_name) = split_canonical(&update.node_id);
        let entity_type = update
            .r#type
            .as_deref()
            .and_then(|t| t.parse::<EntityType>().ok())
            .unwrap_or(inferred_type);
        let attrs: AttributeMap = update.attributes.clone();
        graph.add_or_update_node(update.node_id.clone(), entity_type, display_name, None, attrs);
        counts.nodes_updated += 1;
    }

    for edge in &delta.edges_to_add {
        if graph
            .add_edge(edge.source.clone(), edge.target.clone(), edge.relationship.clone(), AttributeMap::new())
            .is_ok()
        {
            counts.edges_added += 1;
        }
    }

    for delete in &delta.nodes_to_delete {
        let removed = match delete.deletion_type {
            DeletionType::Death | DeletionType::Default => graph.mark_node_deleted(&delete.node_id, delete.reason.clone()),
            DeletionType::Lost => graph.delete_node(&delete.node_id),
        };
        if removed {
            counts.nodes_deleted += 1;
        }
    }

    for edge_delete in &delta.edges_to_delete {
        counts.edges_deleted += graph.delete_edge(&edge_delete.source, &edge_delete.target, &edge_delete.relationship);
    }

    counts
}

/// Orchestrates window bookkeeping, extraction, validation, and application
/// for one session (§4.8). One instance per session.
pub struct DelayedUpdateCoordinator {
    window: Mutex<SlidingWindow>,
    extraction_lock: ExtractionLock,
    agent: Option<Arc<dyn DeltaExtractor>>,
    local_extractor: LocalRuleExtractor,
}

impl DelayedUpdateCoordinator {
    pub fn new(capacity: usize, delay: usize, agent: Option<Arc<dyn DeltaExtractor>>) -> Self {
        Self {
            window: Mutex::new(SlidingWindow::new(capacity, delay)),
            extraction_lock: ExtractionLock::new(),
            agent,
            local_extractor: LocalRuleExtractor::new(),
        }
    }

    pub fn window_info(&self) -> WindowInfo {
        self.window.lock().info()
    }

    /// Reconciles the window against an authoritative external history
    /// (§4.9), delegated to [`ConflictResolver::sync`] under the window's
    /// own lock.
    pub fn sync_conflicts(&self, authoritative_history: &[AuthoritativeTurn]) -> SyncCounters {
        let mut window = self.window.lock();
        ConflictResolver::sync(&mut window, authoritative_history)
    }

    /// §4.8 `process_new_conversation`. Persists the graph and entities
    /// mirror to `graph_path`/`mirror_path` when an extraction actually ran
    /// and mutated the graph.
    pub async fn process_new_conversation(
        &self,
        memory: &mut SessionMemory,
        user_text: &str,
        assistant_text: &str,
        graph_path: Option<&Path>,
        mirror_path: Option<&Path>,
    ) -> Result<ProcessResult> {
        let (new_sequence, ready_target) = {
            let mut window = self.window.lock();
            window.push(user_text, assistant_text)
        };

        let mut target_processed = false;
        let mut graph_updates = GraphUpdateCounts::default();

        if let Some(target_sequence) = ready_target {
            if let Some(permit) = self.extraction_lock.try_acquire() {
                let context = {
                    let window = self.window.lock();
                    recent_context(&window, target_sequence)
                };
                let Some((target_user, target_assistant)) = ({
                    let window = self.window.lock();
                    window.get(target_sequence).map(|t| (t.user_text.clone(), t.assistant_text.clone()))
                }) else {
                    drop(permit);
                    return Ok(ProcessResult {
                        new_sequence,
                        target_processed: false,
                        window_info: self.window.lock().info(),
                        graph_updates,
                    });
                };

                let snapshot = graph_snapshot(&memory.graph);
                let delta = self.extract(&target_user, &target_assistant, &snapshot, &context).await;
                let (cleaned, _counters) = ValidationLayer::validate(delta, &memory.graph);
                graph_updates = apply_delta(&mut memory.graph, &cleaned);

                if let Some(target) = self.window.lock().target_mut() {
                    if target.sequence == target_sequence {
                        target.processed = true;
                        target_processed = true;
                    }
                }

                if let Some(path) = graph_path {
                    memory.graph.save(path)?;
                }
                if let Some(path) = mirror_path {
                    memory.sync_entities_to_disk(path)?;
                }

                drop(permit);
            }
        }

        Ok(ProcessResult {
            new_sequence,
            target_processed,
            window_info: self.window.lock().info(),
            graph_updates,
        })
    }

    async fn extract(&self, user_text: &str, assistant_text: &str, graph_snapshot: &str, recent_context: &str) -> Delta {
        if let Some(agent) = &self.agent {
            match agent.extract(user_text, assistant_text, graph_snapshot, recent_context).await {
                Ok(delta) => return delta,
                Err(err) => {
                    tracing::warn!(error = %err, "LLM extraction failed, falling back to local rule extractor");
                }
            }
        }
        self.local_extractor
            .extract(user_text, assistant_text, graph_snapshot, recent_context)
            .await
            .unwrap_or_default()
    }
}

/// Builds the "last ≤ 3 completed turns" context snippet (§4.8 step 3).
fn recent_context(window: &SlidingWindow, before_sequence: u64) -> String {
    let mut completed: Vec<&Turn> = window
        .iter()
        .filter(|t| t.processed && t.sequence < before_sequence)
        .collect();
    completed.sort_by_key(|t| t.sequence);
    let start = completed.len().saturating_sub(3);

    let mut out = String::new();
    for turn in &completed[start..] {
        out.push_str(&format!("User: {}\nAssistant: {}\n", turn.user_text, turn.assistant_text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nm_domain::error::LlmError;
    use nm_llm::NodeUpdate;

    struct StubAgent;

    #[async_trait]
    impl DeltaExtractor for StubAgent {
        async fn extract(&self, _u: &str, _a: &str, _s: &str, _c: &str) -> std::result::Result<Delta, LlmError> {
            Ok(Delta {
                nodes_to_update: vec![NodeUpdate {
                    node_id: "Seraphina".into(),
                    r#type: Some("character".into()),
                    attributes: Default::default(),
                }],
                ..Delta::default()
            })
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl DeltaExtractor for FailingAgent {
        async fn extract(&self, _u: &str, _a: &str, _s: &str, _c: &str) -> std::result::Result<Delta, LlmError> {
            Err(LlmError::Timeout)
        }
    }

    #[tokio::test]
    async fn no_target_ready_on_first_turn_with_default_delay() {
        let coordinator = DelayedUpdateCoordinator::new(4, 1, None);
        let mut memory = SessionMemory::new();
        let result = coordinator
            .process_new_conversation(&mut memory, "hi", "hello", None, None)
            .await
            .unwrap();
        assert!(!result.target_processed);
        assert_eq!(result.new_sequence, 1);
    }

    #[tokio::test]
    async fn third_turn_triggers_extraction() {
        let coordinator = DelayedUpdateCoordinator::new(4, 1, Some(Arc::new(StubAgent)));
        let mut memory = SessionMemory::new();
        coordinator.process_new_conversation(&mut memory, "a", "A", None, None).await.unwrap();
        let second = coordinator.process_new_conversation(&mut memory, "b", "B", None, None).await.unwrap();
        assert!(!second.target_processed);
        let result = coordinator.process_new_conversation(&mut memory, "c", "C", None, None).await.unwrap();
        assert!(result.target_processed);
        assert_eq!(result.graph_updates.nodes_updated, 1);
        assert!(memory.graph.get_node("character_seraphina").is_some());
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_local_rule_extractor() {
        let coordinator = DelayedUpdateCoordinator::new(4, 1, Some(Arc::new(FailingAgent)));
        let mut memory = SessionMemory::new();
        coordinator.process_new_conversation(&mut memory, "a", "A", None, None).await.unwrap();
        // "b" becomes the target turn (idx = len-1-delay) once "c" is pushed.
        coordinator
            .process_new_conversation(&mut memory, "b", "[update: Seraphina mood=wary]", None, None)
            .await
            .unwrap();
        let result = coordinator.process_new_conversation(&mut memory, "c", "C", None, None).await.unwrap();
        assert!(result.target_processed);
        assert_eq!(result.graph_updates.nodes_updated, 1);
    }
}
