//! `enhance_prompt`, `update_memory`, `process_conversation`,
//! `sync_conversation`, and the `sessions/{id}/*` family (§6.1).

use axum::extract::{Path, State};
use axum::Json;

use nm_domain::error::Error as DomainError;
use nm_protocol::{
    AckResponse, EnhancePromptRequest, EnhancePromptResponse, ProcessConversationRequest,
    ProcessConversationResponse, ProcessingStats, ReinitializeResponse, ResetRequest,
    SessionStatsResponse, SyncConversationRequest, SyncConversationResponse, UpdateMemoryRequest,
    UpdateMemoryResponse,
};
use nm_window::AuthoritativeTurn;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

async fn require_session(state: &AppState, session_id: &str) -> ApiResult<std::sync::Arc<nm_session::SessionEngine>> {
    state
        .sessions
        .get(session_id)
        .ok_or_else(|| ApiError(DomainError::NotFound(format!("no session {session_id}"))))
}

pub async fn enhance_prompt(
    State(state): State<AppState>,
    Json(req): Json<EnhancePromptRequest>,
) -> ApiResult<Json<EnhancePromptResponse>> {
    let engine = require_session(&state, &req.session_id).await?;
    let outcome = engine.enhance_prompt(&req.user_input, req.max_context_length, req.recent_history.unwrap_or(0));

    Ok(Json(EnhancePromptResponse {
        enhanced_context: outcome.enhanced_context,
        entities_found: outcome.entities_found,
        context_stats: ProcessingStats {
            candidates_scanned: outcome.stats.candidates_scanned,
            matches_found: outcome.stats.matches_found,
        },
    }))
}

pub async fn update_memory(
    State(state): State<AppState>,
    Json(req): Json<UpdateMemoryRequest>,
) -> ApiResult<Json<UpdateMemoryResponse>> {
    let engine = require_session(&state, &req.session_id).await?;
    let outcome = engine.extract_updates_from_response(&req.user_input, &req.llm_response).await?;

    Ok(Json(UpdateMemoryResponse {
        message: "memory updated".to_string(),
        nodes_updated: outcome.nodes_updated,
        edges_added: outcome.edges_added,
        processing_stats: ProcessingStats::default(),
    }))
}

/// §6.1 `/process_conversation`: falls back to the `/update_memory`
/// behavior when the session has no window subsystem configured
/// (`SessionEngine::process_conversation` already implements the fallback).
pub async fn process_conversation(
    State(state): State<AppState>,
    Json(req): Json<ProcessConversationRequest>,
) -> ApiResult<Json<ProcessConversationResponse>> {
    let engine = require_session(&state, &req.session_id).await?;
    let outcome = engine.process_conversation(&req.user_input, &req.llm_response).await?;

    Ok(Json(ProcessConversationResponse {
        turn_sequence: outcome.turn_sequence,
        turn_processed: outcome.turn_processed,
        target_processed: outcome.target_processed,
        window_size: outcome.window_size,
        nodes_updated: outcome.nodes_updated,
        edges_added: outcome.edges_added,
        conflicts_resolved: 0,
        processing_stats: ProcessingStats::default(),
    }))
}

pub async fn sync_conversation(
    State(state): State<AppState>,
    Json(req): Json<SyncConversationRequest>,
) -> ApiResult<Json<SyncConversationResponse>> {
    let engine = require_session(&state, &req.session_id).await?;
    let history: Vec<AuthoritativeTurn> = req
        .tavern_history
        .into_iter()
        .enumerate()
        .map(|(i, entry)| AuthoritativeTurn {
            sequence: i as u64 + 1,
            user_text: entry.user_input,
            assistant_text: entry.llm_response,
            external_message_id: entry.external_message_id,
        })
        .collect();

    let counters = engine.sync_conversation(&history);

    Ok(Json(SyncConversationResponse {
        conflicts_detected: counters.conflicts_detected,
        conflicts_resolved: counters.conflicts_resolved,
        window_synced: true,
    }))
}

pub async fn session_stats(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult<Json<SessionStatsResponse>> {
    let engine = require_session(&state, &session_id).await?;
    let stats = engine.stats();

    Ok(Json(SessionStatsResponse {
        session_id: stats.session_id,
        turn_count: stats.turn_count,
        nodes: stats.nodes,
        edges: stats.edges,
        created_at: stats.created_at,
    }))
}

pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ResetRequest>,
) -> ApiResult<Json<AckResponse>> {
    let engine = require_session(&state, &session_id).await?;
    engine.reset(req.keep_character_data)?;
    Ok(Json(AckResponse {
        success: true,
        message: "session reset".to_string(),
    }))
}

pub async fn clear_session(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult<Json<AckResponse>> {
    let engine = require_session(&state, &session_id).await?;
    engine.clear()?;
    Ok(Json(AckResponse {
        success: true,
        message: "graph cleared".to_string(),
    }))
}

/// §6.1 `/sessions/{id}/reinitialize`: minimal, from the stored character
/// name — never calls the LLM bootstrapper.
pub async fn reinitialize_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ReinitializeResponse>> {
    let engine = require_session(&state, &session_id).await?;
    let outcome = engine.reinitialize_minimal().await?;

    Ok(Json(ReinitializeResponse {
        character_name: outcome.character_name,
        nodes_created: outcome.nodes_added,
        edges_created: outcome.edges_added,
    }))
}
