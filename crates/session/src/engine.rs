//! SessionEngine (§4.11): per-session facade composing `SessionMemory`,
//! `DelayedUpdateCoordinator`, and the LLM/local extraction paths behind one
//! API surface.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nm_domain::config::SlidingWindowConfig;
use nm_domain::error::Result;
use nm_graph::{canonical_id, AttributeMap, EntityType, KnowledgeGraph};
use nm_llm::{
    BootstrapEntity, CardBootstrapper, CharacterBootstrap, Delta, DeltaExtractor,
    LocalRuleExtractor, PerceptionExtractor, PerceptionStats, ValidationLayer,
};
use nm_memory::SessionMemory;
use nm_window::{AuthoritativeTurn, DelayedUpdateCoordinator, SyncCounters};
use parking_lot::Mutex;

/// The character-card fields a bootstrap is seeded from. Free-form; callers
/// (the HTTP/plugin layer) are responsible for collecting these from the
/// frontend's character card format.
#[derive(Debug, Clone, Default)]
pub struct CharacterCard {
    pub name: String,
    pub description: String,
    pub personality: String,
    pub scenario: String,
}

impl CharacterCard {
    fn as_prompt_text(&self) -> String {
        format!(
            "Name: {}\nDescription: {}\nPersonality: {}\nScenario: {}",
            self.name, self.description, self.personality, self.scenario
        )
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub nodes_added: usize,
    pub edges_added: usize,
    pub method: &'static str,
    pub character_name: String,
}

#[derive(Debug, Clone)]
pub struct EnhancePromptOutcome {
    pub enhanced_context: String,
    pub entities_found: Vec<String>,
    pub stats: PerceptionStats,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    pub nodes_updated: usize,
    pub edges_added: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessConversationOutcome {
    pub turn_sequence: u64,
    pub turn_processed: bool,
    pub target_processed: bool,
    pub window_size: usize,
    pub nodes_updated: usize,
    pub edges_added: usize,
}

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub session_id: String,
    pub nodes: usize,
    pub edges: usize,
    pub turn_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Multi-byte-safe truncation: never splits a UTF-8 codepoint, appends a
/// tail marker when truncated.
fn truncate_with_marker(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n…[truncated]", &s[..end])
}

fn minimal_bootstrap(card: &CharacterCard) -> CharacterBootstrap {
    CharacterBootstrap {
        main_character: card.name.clone(),
        entities: vec![BootstrapEntity {
            name: card.name.clone(),
            entity_type: "character".to_string(),
            description: card.description.clone(),
            attributes: HashMap::new(),
        }],
        relationships: vec![],
    }
}

/// Resolves bootstrap entity/relationship names to canonical ids and applies
/// them to `graph`. Relation endpoints not present among the entities (or
/// equal to `main_character`) are skipped — never invented (§4.4#1).
fn apply_bootstrap(graph: &mut KnowledgeGraph, bootstrap: &CharacterBootstrap) -> (usize, usize) {
    let mut name_to_id = HashMap::new();
    let mut nodes_added = 0;

    for entity in &bootstrap.entities {
        let entity_type = entity.entity_type.parse::<EntityType>().unwrap_or(EntityType::Unknown);
        let id = canonical_id(entity_type, &entity.name);
        graph.add_or_update_node(
            id.clone(),
            entity_type,
            entity.name.clone(),
            Some(entity.description.clone()),
            entity.attributes.clone(),
        );
        name_to_id.insert(entity.name.clone(), id);
        nodes_added += 1;
    }

    if !name_to_id.contains_key(&bootstrap.main_character) {
        let id = canonical_id(EntityType::Character, &bootstrap.main_character);
        graph.add_or_update_node(
            id.clone(),
            EntityType::Character,
            bootstrap.main_character.clone(),
            None,
            AttributeMap::new(),
        );
        name_to_id.insert(bootstrap.main_character.clone(), id);
        nodes_added += 1;
    }

    let mut edges_added = 0;
    for rel in &bootstrap.relationships {
        let (Some(source), Some(target)) =
            (name_to_id.get(&rel.source), name_to_id.get(&rel.target))
        else {
            continue;
        };
        if graph
            .add_edge(source.clone(), target.clone(), rel.relationship.clone(), AttributeMap::new())
            .is_ok()
        {
            edges_added += 1;
        }
    }

    (nodes_added, edges_added)
}

/// Per-session facade (§4.11). One instance owns its own graph file, entity
/// mirror, and (optionally) a windowed turn pipeline.
pub struct SessionEngine {
    session_id: String,
    character_mapping_key: String,
    created_at: DateTime<Utc>,
    memory: Mutex<SessionMemory>,
    coordinator: Option<DelayedUpdateCoordinator>,
    bootstrapper: Option<Arc<dyn CardBootstrapper>>,
    agent: Option<Arc<dyn DeltaExtractor>>,
    local_extractor: LocalRuleExtractor,
    graph_path: PathBuf,
    mirror_path: PathBuf,
}

impl SessionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        character_mapping_key: impl Into<String>,
        graph_path: PathBuf,
        mirror_path: PathBuf,
        window: &SlidingWindowConfig,
        bootstrapper: Option<Arc<dyn CardBootstrapper>>,
        agent: Option<Arc<dyn DeltaExtractor>>,
    ) -> Result<Self> {
        let mut memory = SessionMemory::new();
        if graph_path.exists() {
            memory.graph = KnowledgeGraph::load(&graph_path)?;
        }

        let coordinator = (window.window_size > 0)
            .then(|| DelayedUpdateCoordinator::new(window.window_size, window.processing_delay, agent.clone()));

        Ok(Self {
            session_id: session_id.into(),
            character_mapping_key: character_mapping_key.into(),
            created_at: Utc::now(),
            memory: Mutex::new(memory),
            coordinator,
            bootstrapper,
            agent,
            local_extractor: LocalRuleExtractor::new(),
            graph_path,
            mirror_path,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn character_mapping_key(&self) -> &str {
        &self.character_mapping_key
    }

    fn persist_locked(&self, memory: &SessionMemory) -> Result<()> {
        memory.graph.save(&self.graph_path)?;
        memory.sync_entities_to_disk(&self.mirror_path)?;
        Ok(())
    }

    async fn extract(&self, user_text: &str, assistant_text: &str, snapshot: &str, recent_context: &str) -> Delta {
        if let Some(agent) = &self.agent {
            match agent.extract(user_text, assistant_text, snapshot, recent_context).await {
                Ok(delta) => return delta,
                Err(err) => {
                    tracing::warn!(error = %err, "LLM extraction failed, falling back to local rule extractor");
                }
            }
        }
        self.local_extractor
            .extract(user_text, assistant_text, snapshot, recent_context)
            .await
            .unwrap_or_default()
    }

    /// §4.11 `initialize_from_character`. Idempotent: a session whose graph
    /// is already non-empty returns its existing stats without mutation
    /// (§8 idempotence invariant).
    pub async fn initialize_from_character(&self, card: &CharacterCard, world_info: &str) -> Result<BootstrapOutcome> {
        let mut memory = self.memory.lock();
        if memory.graph.len_nodes() > 0 {
            let character_name = memory
                .get_state("character_name")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| card.name.clone());
            return Ok(BootstrapOutcome {
                nodes_added: 0,
                edges_added: 0,
                method: "existing",
                character_name,
            });
        }

        let bootstrapped = match &self.bootstrapper {
            Some(b) => match b.bootstrap(&card.as_prompt_text(), world_info).await {
                Ok(bootstrap) => Some(bootstrap),
                Err(err) => {
                    tracing::warn!(error = %err, "character bootstrap failed, falling back to minimal bootstrap");
                    None
                }
            },
            None => None,
        };

        let (method, bootstrap) = match bootstrapped {
            Some(b) => ("llm", b),
            None => ("minimal", minimal_bootstrap(card)),
        };

        let (nodes_added, edges_added) = apply_bootstrap(&mut memory.graph, &bootstrap);
        memory.set_state("character_name", serde_json::Value::String(bootstrap.main_character.clone()));
        self.persist_locked(&memory)?;

        Ok(BootstrapOutcome {
            nodes_added,
            edges_added,
            method,
            character_name: bootstrap.main_character,
        })
    }

    /// §4.11 `enhance_prompt`.
    pub fn enhance_prompt(&self, user_input: &str, max_context_length: usize, recent_turns_hint: usize) -> EnhancePromptOutcome {
        let memory = self.memory.lock();
        let (entities_found, stats) = PerceptionExtractor::detect_entities(user_input, &memory.graph);
        let context = memory.retrieve_context_for_prompt(&entities_found, recent_turns_hint);
        let enhanced_context = truncate_with_marker(&context, max_context_length);
        EnhancePromptOutcome {
            enhanced_context,
            entities_found,
            stats,
        }
    }

    /// §4.11 `extract_updates_from_response`: the non-windowed, single-shot
    /// path backing `POST /update_memory`.
    pub async fn extract_updates_from_response(&self, user_input: &str, assistant_response: &str) -> Result<UpdateOutcome> {
        let mut memory = self.memory.lock();
        let snapshot = nm_window::graph_snapshot(&memory.graph);
        let delta = self.extract(user_input, assistant_response, &snapshot, "").await;
        let (cleaned, _counters) = ValidationLayer::validate(delta, &memory.graph);
        let counts = nm_window::apply_delta(&mut memory.graph, &cleaned);
        memory.add_conversation(user_input, assistant_response);
        self.persist_locked(&memory)?;

        Ok(UpdateOutcome {
            nodes_updated: counts.nodes_updated,
            edges_added: counts.edges_added,
        })
    }

    /// §4.11 `process_conversation`: the windowed path (§4.8). Falls back to
    /// the non-windowed path when no window subsystem was configured for
    /// this session (§6.1 `/process_conversation` note).
    pub async fn process_conversation(&self, user_input: &str, assistant_response: &str) -> Result<ProcessConversationOutcome> {
        match &self.coordinator {
            Some(coordinator) => {
                let mut memory = self.memory.lock();
                let result = coordinator
                    .process_new_conversation(
                        &mut memory,
                        user_input,
                        assistant_response,
                        Some(&self.graph_path),
                        Some(&self.mirror_path),
                    )
                    .await?;
                memory.add_conversation(user_input, assistant_response);
                Ok(ProcessConversationOutcome {
                    turn_sequence: result.new_sequence,
                    turn_processed: true,
                    target_processed: result.target_processed,
                    window_size: result.window_info.len,
                    nodes_updated: result.graph_updates.nodes_updated,
                    edges_added: result.graph_updates.edges_added,
                })
            }
            None => {
                let outcome = self.extract_updates_from_response(user_input, assistant_response).await?;
                Ok(ProcessConversationOutcome {
                    turn_sequence: 0,
                    turn_processed: true,
                    target_processed: true,
                    window_size: 0,
                    nodes_updated: outcome.nodes_updated,
                    edges_added: outcome.edges_added,
                })
            }
        }
    }

    /// §4.9, dispatched through `sync_conversation`. No-op (all-zero
    /// counters) when this session has no window subsystem.
    pub fn sync_conversation(&self, authoritative_history: &[AuthoritativeTurn]) -> SyncCounters {
        match &self.coordinator {
            Some(coordinator) => coordinator.sync_conflicts(authoritative_history),
            None => SyncCounters::default(),
        }
    }

    /// §4.11 `reinitialize`: clears the graph and chat log, then re-runs
    /// bootstrap unconditionally (bypassing the idempotence check).
    pub async fn reinitialize(&self, card: &CharacterCard, world_info: &str) -> Result<BootstrapOutcome> {
        {
            let mut memory = self.memory.lock();
            memory.graph.clear();
            memory.clear_conversation_log();
        }
        self.initialize_from_character(card, world_info).await
    }

    /// §6.1 `/sessions/{id}/reinitialize`: always takes the minimal
    /// (non-LLM) bootstrap path, seeded only from the character name
    /// already recorded in session state.
    pub async fn reinitialize_minimal(&self) -> Result<BootstrapOutcome> {
        let mut memory = self.memory.lock();
        let character_name = memory
            .get_state("character_name")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| nm_domain::error::Error::NotFound("no stored character name for this session".into()))?;

        memory.graph.clear();
        memory.clear_conversation_log();

        let card = CharacterCard { name: character_name, ..Default::default() };
        let bootstrap = minimal_bootstrap(&card);
        let (nodes_added, edges_added) = apply_bootstrap(&mut memory.graph, &bootstrap);
        memory.set_state("character_name", serde_json::Value::String(bootstrap.main_character.clone()));
        self.persist_locked(&memory)?;

        Ok(BootstrapOutcome {
            nodes_added,
            edges_added,
            method: "minimal",
            character_name: bootstrap.main_character,
        })
    }

    /// §4.11 `clear`: empties the graph only.
    pub fn clear(&self) -> Result<()> {
        let mut memory = self.memory.lock();
        memory.graph.clear();
        self.persist_locked(&memory)
    }

    /// §4.11 `reset(keep_graph)`: `true` keeps the graph and clears only the
    /// chat log; `false` clears both.
    pub fn reset(&self, keep_graph: bool) -> Result<()> {
        let mut memory = self.memory.lock();
        if !keep_graph {
            memory.graph.clear();
        }
        memory.clear_conversation_log();
        self.persist_locked(&memory)
    }

    pub fn stats(&self) -> SessionStats {
        let memory = self.memory.lock();
        let turn_count = self
            .coordinator
            .as_ref()
            .map(|c| c.window_info().len as u64)
            .unwrap_or_else(|| memory.conversation_log().len() as u64);
        SessionStats {
            session_id: self.session_id.clone(),
            nodes: memory.graph.len_nodes(),
            edges: memory.graph.len_edges(),
            turn_count,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nm_domain::error::LlmError;
    use nm_llm::BootstrapRelationship;

    struct StubBootstrapper;

    #[async_trait]
    impl CardBootstrapper for StubBootstrapper {
        async fn bootstrap(&self, _card: &str, _world: &str) -> std::result::Result<CharacterBootstrap, LlmError> {
            Ok(CharacterBootstrap {
                main_character: "Seraphina".into(),
                entities: vec![
                    BootstrapEntity {
                        name: "Seraphina".into(),
                        entity_type: "character".into(),
                        description: "a rogue".into(),
                        attributes: HashMap::new(),
                    },
                    BootstrapEntity {
                        name: "Tavern".into(),
                        entity_type: "location".into(),
                        description: "a dim tavern".into(),
                        attributes: HashMap::new(),
                    },
                ],
                relationships: vec![BootstrapRelationship {
                    source: "Seraphina".into(),
                    target: "Tavern".into(),
                    relationship: "located_in".into(),
                }],
            })
        }
    }

    fn engine(dir: &std::path::Path) -> SessionEngine {
        SessionEngine::new(
            "s1",
            "tavern::seraphina",
            dir.join("graph.json"),
            dir.join("entities.json"),
            &SlidingWindowConfig { window_size: 4, processing_delay: 1, enable_enhanced_agent: true },
            Some(Arc::new(StubBootstrapper)),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn bootstrap_via_llm_creates_nodes_and_edges() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let card = CharacterCard { name: "Seraphina".into(), ..Default::default() };

        let outcome = engine.initialize_from_character(&card, "").await.unwrap();
        assert_eq!(outcome.method, "llm");
        assert_eq!(outcome.nodes_added, 2);
        assert_eq!(outcome.edges_added, 1);
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent_on_nonempty_graph() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let card = CharacterCard { name: "Seraphina".into(), ..Default::default() };

        engine.initialize_from_character(&card, "").await.unwrap();
        let second = engine.initialize_from_character(&card, "").await.unwrap();
        assert_eq!(second.method, "existing");
        assert_eq!(second.nodes_added, 0);
    }

    #[tokio::test]
    async fn minimal_bootstrap_used_without_bootstrapper() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SessionEngine::new(
            "s2",
            "tavern::nobootstrap",
            dir.path().join("graph.json"),
            dir.path().join("entities.json"),
            &SlidingWindowConfig::default(),
            None,
            None,
        )
        .unwrap();
        let card = CharacterCard { name: "Garrick".into(), description: "a blacksmith".into(), ..Default::default() };
        let outcome = engine.initialize_from_character(&card, "").await.unwrap();
        assert_eq!(outcome.method, "minimal");
        assert_eq!(outcome.nodes_added, 1);
    }

    #[tokio::test]
    async fn enhance_prompt_detects_bootstrapped_entity() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let card = CharacterCard { name: "Seraphina".into(), ..Default::default() };
        engine.initialize_from_character(&card, "").await.unwrap();

        let outcome = engine.enhance_prompt("Seraphina walks in.", 500, 0);
        assert!(outcome.entities_found.iter().any(|e| e.contains("seraphina")));
        assert!(outcome.enhanced_context.contains("Seraphina"));
    }

    #[tokio::test]
    async fn process_conversation_falls_back_without_window() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SessionEngine::new(
            "s3",
            "tavern::nowindow",
            dir.path().join("graph.json"),
            dir.path().join("entities.json"),
            &SlidingWindowConfig { window_size: 0, processing_delay: 0, enable_enhanced_agent: false },
            None,
            None,
        )
        .unwrap();
        let outcome = engine
            .process_conversation("hi", "[update: Garrick mood=tired]")
            .await
            .unwrap();
        assert!(outcome.turn_processed);
        assert_eq!(outcome.turn_sequence, 0);
        assert_eq!(outcome.nodes_updated, 1);
    }

    #[tokio::test]
    async fn reset_keep_graph_preserves_nodes_clears_log() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let card = CharacterCard { name: "Seraphina".into(), ..Default::default() };
        engine.initialize_from_character(&card, "").await.unwrap();
        engine.extract_updates_from_response("hi", "hello").await.unwrap();

        engine.reset(true).unwrap();
        let stats = engine.stats();
        assert!(stats.nodes > 0);
    }

    #[tokio::test]
    async fn reinitialize_minimal_uses_stored_name_without_llm() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let card = CharacterCard { name: "Seraphina".into(), ..Default::default() };
        engine.initialize_from_character(&card, "").await.unwrap();

        let outcome = engine.reinitialize_minimal().await.unwrap();
        assert_eq!(outcome.method, "minimal");
        assert_eq!(outcome.character_name, "Seraphina");
        assert_eq!(outcome.nodes_added, 1);
    }

    #[tokio::test]
    async fn reinitialize_clears_and_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let card = CharacterCard { name: "Seraphina".into(), ..Default::default() };
        engine.initialize_from_character(&card, "").await.unwrap();

        let outcome = engine.reinitialize(&card, "").await.unwrap();
        assert_eq!(outcome.method, "llm");
        assert_eq!(outcome.nodes_added, 2);
    }
}
