//! SessionManager (§4.12): process-wide registry of `SessionEngine`s,
//! double-checked creation, the async-init task table, and coordinated
//! reinitialization.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nm_domain::config::SlidingWindowConfig;
use nm_domain::error::Result;
use nm_domain::trace::TraceEvent;
use nm_llm::{CardBootstrapper, DeltaExtractor};
use nm_memory::StorageManager;
use nm_protocol::{close_code, PluginEvent};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::channel::ChannelRegistry;
use crate::engine::{BootstrapOutcome, CharacterCard, SessionEngine};

/// Builds a `CharacterCard` out of a plugin-submitted `character_data` blob.
/// Unrecognized/missing fields default to empty strings rather than failing
/// — a plugin submission is never rejected for being incomplete.
pub fn card_from_plugin_data(character_name: &str, data: &serde_json::Value) -> CharacterCard {
    let field = |key: &str| data.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    CharacterCard {
        name: character_name.to_string(),
        description: field("description"),
        personality: field("personality"),
        scenario: field("scenario"),
    }
}

/// Extracts the `world_info` field a plugin submission may carry alongside
/// the character card proper.
pub fn world_info_from_plugin_data(data: &serde_json::Value) -> String {
    data.get("world_info").and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// §3 `AsyncInitTask`.
#[derive(Debug, Clone, Serialize)]
pub struct AsyncInitTask {
    pub task_id: String,
    pub status: InitTaskStatus,
    pub progress: f32,
    pub message: String,
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes_added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges_added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Process-wide registry of sessions, creation locks, async init tasks, and
/// the coordinated-reinit set (§3 "Process-wide", §4.12).
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionEngine>>>,
    session_creation_locks: RwLock<HashMap<String, Arc<AsyncMutex<()>>>>,
    init_tasks: RwLock<HashMap<String, AsyncInitTask>>,
    plugin_character_data: RwLock<HashMap<String, (serde_json::Value, DateTime<Utc>)>>,
    pending_coordinated_reinits: RwLock<HashSet<String>>,
    tavern_mode_active: AtomicBool,

    storage: Arc<StorageManager>,
    channels: Arc<ChannelRegistry>,
    window: SlidingWindowConfig,
    bootstrapper: Option<Arc<dyn CardBootstrapper>>,
    agent: Option<Arc<dyn DeltaExtractor>>,
}

impl SessionManager {
    pub fn new(
        storage: Arc<StorageManager>,
        channels: Arc<ChannelRegistry>,
        window: SlidingWindowConfig,
        bootstrapper: Option<Arc<dyn CardBootstrapper>>,
        agent: Option<Arc<dyn DeltaExtractor>>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_creation_locks: RwLock::new(HashMap::new()),
            init_tasks: RwLock::new(HashMap::new()),
            plugin_character_data: RwLock::new(HashMap::new()),
            pending_coordinated_reinits: RwLock::new(HashSet::new()),
            tavern_mode_active: AtomicBool::new(false),
            storage,
            channels,
            window,
            bootstrapper,
            agent,
        }
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn tavern_mode_active(&self) -> bool {
        self.tavern_mode_active.load(Ordering::SeqCst)
    }

    pub fn set_tavern_mode_active(&self, active: bool) {
        self.tavern_mode_active.store(active, Ordering::SeqCst);
        TraceEvent::TavernModeChanged { active }.emit();
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionEngine>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// §4.12 double-checked creation. `is_test` routes the session's graph
    /// and entity mirror into the scratch (`test/`) subtree so it can be
    /// wiped independently of real play data by `full_reset`.
    pub async fn get_or_create(&self, session_id: &str, character_mapping_key: &str, is_test: bool) -> Result<Arc<SessionEngine>> {
        if let Some(engine) = self.sessions.read().get(session_id).cloned() {
            return Ok(engine);
        }

        let lock = self
            .session_creation_locks
            .write()
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(engine) = self.sessions.read().get(session_id).cloned() {
            return Ok(engine);
        }

        let engine = Arc::new(SessionEngine::new(
            session_id,
            character_mapping_key,
            self.storage.get_graph_path(session_id, is_test),
            self.storage.get_entities_mirror_path(session_id, is_test),
            &self.window,
            self.bootstrapper.clone(),
            self.agent.clone(),
        )?);
        self.sessions.write().insert(session_id.to_string(), engine.clone());
        TraceEvent::SessionCreated {
            session_id: session_id.to_string(),
            character_mapping_key: character_mapping_key.to_string(),
        }
        .emit();

        Ok(engine)
    }

    fn update_task(&self, task_id: &str, progress: f32, message: &str, status: InitTaskStatus) {
        if let Some(task) = self.init_tasks.write().get_mut(task_id) {
            task.progress = progress;
            task.message = message.to_string();
            task.status = status;
            task.updated_at = Utc::now();
        }
    }

    fn complete_task(&self, task_id: &str, outcome: &BootstrapOutcome) {
        if let Some(task) = self.init_tasks.write().get_mut(task_id) {
            task.progress = 1.0;
            task.status = InitTaskStatus::Completed;
            task.message = "initialization complete".to_string();
            task.nodes_added = Some(outcome.nodes_added);
            task.edges_added = Some(outcome.edges_added);
            task.updated_at = Utc::now();
        }
    }

    fn fail_task(&self, task_id: &str, error: String) {
        if let Some(task) = self.init_tasks.write().get_mut(task_id) {
            task.status = InitTaskStatus::Failed;
            task.message = "initialization failed".to_string();
            task.error = Some(error);
            task.updated_at = Utc::now();
        }
    }

    pub fn get_task(&self, task_id: &str) -> Option<AsyncInitTask> {
        self.init_tasks.read().get(task_id).cloned()
    }

    /// §4.12 `initialize_async`: allocates a task id and runs bootstrap on a
    /// worker, updating `init_tasks` at the 0.1/0.2/0.6/0.8/1.0 milestones.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize_async(
        self: &Arc<Self>,
        session_id: String,
        character_mapping_key: String,
        card: CharacterCard,
        world_info: String,
        is_test: bool,
    ) -> String {
        let task_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.init_tasks.write().insert(
            task_id.clone(),
            AsyncInitTask {
                task_id: task_id.clone(),
                status: InitTaskStatus::Pending,
                progress: 0.0,
                message: "queued".to_string(),
                session_id: Some(session_id.clone()),
                nodes_added: None,
                edges_added: None,
                error: None,
                started_at: now,
                updated_at: now,
            },
        );

        let manager = self.clone();
        let tid = task_id.clone();
        tokio::spawn(async move {
            manager.run_initialize_async(tid, session_id, character_mapping_key, card, world_info, is_test).await;
        });

        task_id
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_initialize_async(
        self: Arc<Self>,
        task_id: String,
        session_id: String,
        character_mapping_key: String,
        card: CharacterCard,
        world_info: String,
        is_test: bool,
    ) {
        self.update_task(&task_id, 0.1, "allocating session", InitTaskStatus::Running);

        let engine = match self.get_or_create(&session_id, &character_mapping_key, is_test).await {
            Ok(engine) => engine,
            Err(err) => {
                self.fail_task(&task_id, err.to_string());
                return;
            }
        };
        self.update_task(&task_id, 0.2, "session ready", InitTaskStatus::Running);
        self.update_task(&task_id, 0.6, "running character bootstrap", InitTaskStatus::Running);

        match engine.initialize_from_character(&card, &world_info).await {
            Ok(outcome) => {
                self.update_task(&task_id, 0.8, "persisting graph", InitTaskStatus::Running);
                self.complete_task(&task_id, &outcome);
                self.channels
                    .push(
                        &session_id,
                        PluginEvent::InitializationComplete {
                            session_id: session_id.clone(),
                            nodes_added: outcome.nodes_added,
                            edges_added: outcome.edges_added,
                        },
                    )
                    .await;
            }
            Err(err) => self.fail_task(&task_id, err.to_string()),
        }
    }

    /// §4.12 `coordinated_reinit`: only meaningful for a session with a
    /// bound socket. Returns `false` (no-op) otherwise.
    pub async fn coordinated_reinit(&self, session_id: &str) -> bool {
        if !self.channels.is_bound(session_id) {
            return false;
        }
        self.pending_coordinated_reinits.write().insert(session_id.to_string());
        self.channels
            .push(
                session_id,
                PluginEvent::RequestCharacterSubmission {
                    session_id: session_id.to_string(),
                },
            )
            .await;
        true
    }

    /// §4.12: the plugin's response to `request_character_submission`.
    /// Matches the submission against `pending_coordinated_reinits` by
    /// character id, name, or session-id prefix; dispatches reinitialize on
    /// a worker when a match is found. `character_data` is stored verbatim
    /// in `plugin_character_data` (§3) and is also what a later
    /// `/tavern/sessions/{id}/reinitialize_from_plugin` call replays.
    pub fn submit_character(self: &Arc<Self>, character_id: String, character_name: String, character_data: serde_json::Value) {
        self.plugin_character_data
            .write()
            .insert(character_id.clone(), (character_data.clone(), Utc::now()));

        let matched = {
            let pending = self.pending_coordinated_reinits.read();
            pending
                .iter()
                .find(|session_id| {
                    session_id.as_str() == character_id.as_str()
                        || session_id.starts_with(character_id.as_str())
                        || self
                            .sessions
                            .read()
                            .get(session_id.as_str())
                            .is_some_and(|engine| engine.character_mapping_key().contains(character_name.as_str()))
                })
                .cloned()
        };

        let Some(session_id) = matched else {
            return;
        };
        self.pending_coordinated_reinits.write().remove(&session_id);
        self.dispatch_reinitialize_from_plugin_data(session_id, character_name, character_data);
    }

    /// Looks up the most recent plugin submission whose recorded
    /// `character_name` is consistent with `session_id`'s
    /// `character_mapping_key`, for `/tavern/sessions/{id}/reinitialize_from_plugin`.
    pub fn last_plugin_submission_for_session(&self, session_id: &str) -> Option<(String, serde_json::Value)> {
        let mapping_key = self.sessions.read().get(session_id)?.character_mapping_key().to_string();
        self.plugin_character_data
            .read()
            .iter()
            .filter(|(_, (data, _))| {
                data.get("character_name")
                    .and_then(|v| v.as_str())
                    .is_some_and(|name| mapping_key.contains(&name.to_lowercase()))
            })
            .max_by_key(|(_, (_, ts))| *ts)
            .map(|(character_name, (data, _))| (character_name.clone(), data.clone()))
    }

    /// Re-runs bootstrap for `session_id` from a previously submitted
    /// plugin character payload, pushing completion/failure events.
    pub fn dispatch_reinitialize_from_plugin_data(self: &Arc<Self>, session_id: String, character_name: String, character_data: serde_json::Value) {
        let card = card_from_plugin_data(&character_name, &character_data);
        let world_info = world_info_from_plugin_data(&character_data);

        let manager = self.clone();
        tokio::spawn(async move {
            let Some(engine) = manager.sessions.read().get(&session_id).cloned() else {
                return;
            };
            match engine.reinitialize(&card, &world_info).await {
                Ok(_) => {
                    manager
                        .channels
                        .push(
                            &session_id,
                            PluginEvent::AutoReinitializationComplete {
                                session_id: session_id.clone(),
                            },
                        )
                        .await;
                }
                Err(err) => {
                    manager
                        .channels
                        .push(
                            &session_id,
                            PluginEvent::AutoReinitializationFailed {
                                session_id: session_id.clone(),
                                error: err.to_string(),
                            },
                        )
                        .await;
                }
            }
        });
    }

    fn clear_in_memory_state(&self) {
        self.sessions.write().clear();
        self.session_creation_locks.write().clear();
        self.init_tasks.write().clear();
        self.plugin_character_data.write().clear();
        self.pending_coordinated_reinits.write().clear();
    }

    /// §4.12 `full_reset`: closes all sockets with `close_code::NORMAL`, drops
    /// all in-memory maps, and wipes scratch (`is_test`) storage. On-disk
    /// character data outside the test subtree is left untouched — see
    /// DESIGN.md.
    pub async fn full_reset(&self) -> Result<(usize, usize)> {
        let sessions_closed = self.sessions.read().len();
        let sockets_closed = self.channels.close_all(close_code::NORMAL, "full_reset").await;
        self.clear_in_memory_state();
        self.storage.clear_test_data()?;
        Ok((sessions_closed, sockets_closed))
    }

    /// §4.12 `quick_reset`: same as `full_reset` minus the storage wipe.
    pub async fn quick_reset(&self) -> (usize, usize) {
        let sessions_closed = self.sessions.read().len();
        let sockets_closed = self.channels.close_all(close_code::NORMAL, "quick_reset").await;
        self.clear_in_memory_state();
        (sessions_closed, sockets_closed)
    }
}
