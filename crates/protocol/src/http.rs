//! HTTP request/response DTOs shared by `nm-gateway`'s router and
//! `nm-session`'s handlers (§6.1). Kept decoupled from `nm-llm`/`nm-graph`
//! domain types so the wire shape can evolve independently of internal
//! representations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire mirror of `nm_llm::PerceptionStats`, included in several responses
/// under `processing_stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub candidates_scanned: usize,
    pub matches_found: usize,
}

/// Wire mirror of `nm_session::CharacterCard`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterCardDto {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub scenario: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub character_card: CharacterCardDto,
    #[serde(default)]
    pub world_info: String,
    #[serde(default)]
    pub session_config: Option<serde_json::Value>,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default = "d_true")]
    pub enable_agent: bool,
}

fn d_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeResponse {
    pub session_id: String,
    pub message: String,
    pub graph_stats: GraphStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeAsyncResponse {
    pub task_id: String,
    pub message: String,
    pub estimated_time: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableCharactersResponse {
    pub characters: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhancePromptRequest {
    pub session_id: String,
    pub user_input: String,
    #[serde(default)]
    pub recent_history: Option<usize>,
    #[serde(default = "d_max_context_length")]
    pub max_context_length: usize,
}

fn d_max_context_length() -> usize {
    2000
}

#[derive(Debug, Clone, Serialize)]
pub struct EnhancePromptResponse {
    pub enhanced_context: String,
    pub entities_found: Vec<String>,
    pub context_stats: ProcessingStats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMemoryRequest {
    pub session_id: String,
    pub llm_response: String,
    pub user_input: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateMemoryResponse {
    pub message: String,
    pub nodes_updated: usize,
    pub edges_added: usize,
    pub processing_stats: ProcessingStats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConversationRequest {
    pub session_id: String,
    pub user_input: String,
    pub llm_response: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessConversationResponse {
    pub turn_sequence: u64,
    pub turn_processed: bool,
    pub target_processed: bool,
    pub window_size: usize,
    pub nodes_updated: usize,
    pub edges_added: usize,
    pub conflicts_resolved: usize,
    pub processing_stats: ProcessingStats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TavernHistoryEntry {
    pub user_input: String,
    pub llm_response: String,
    #[serde(default)]
    pub external_message_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConversationRequest {
    pub session_id: String,
    pub tavern_history: Vec<TavernHistoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncConversationResponse {
    pub conflicts_detected: usize,
    pub conflicts_resolved: usize,
    pub window_synced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatsResponse {
    pub session_id: String,
    pub turn_count: u64,
    pub nodes: usize,
    pub edges: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub keep_character_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReinitializeResponse {
    pub character_name: String,
    pub nodes_created: usize,
    pub edges_created: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitCharacterRequest {
    pub character_id: String,
    pub character_name: String,
    pub character_data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentSessionResponse {
    pub has_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_nodes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_edges: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    pub ok: bool,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TavernModeResponse {
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TavernModeRequest {
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullResetResponse {
    pub sessions_closed: usize,
    pub sockets_closed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_memory_request_deserializes_optional_fields() {
        let raw = r#"{"session_id":"s1","llm_response":"hi","user_input":"hello"}"#;
        let req: UpdateMemoryRequest = serde_json::from_str(raw).unwrap();
        assert!(req.timestamp.is_none());
        assert!(req.chat_id.is_none());
    }

    #[test]
    fn reset_request_defaults_keep_character_data_false() {
        let req: ResetRequest = serde_json::from_str("{}").unwrap();
        assert!(!req.keep_character_data);
    }
}
