//! The `/tavern/*` plugin-facing surface (§6.1, §4.12). Every handler here
//! is gated by `tavern_mode_active` per §4.13/§7.

use axum::extract::{Path, State};
use axum::Json;

use nm_domain::error::Error as DomainError;
use nm_protocol::{AckResponse, AvailableCharactersResponse, CurrentSessionResponse, SubmitCharacterRequest};

use crate::api::error::{require_tavern_mode, ApiError, ApiResult};
use crate::state::AppState;

/// `POST /tavern/sessions/{id}/reinitialize_from_plugin`: replays the last
/// plugin character submission on record for this session.
pub async fn reinitialize_from_plugin(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<AckResponse>> {
    require_tavern_mode(state.sessions.tavern_mode_active())?;

    let (character_name_key, data) = state
        .sessions
        .last_plugin_submission_for_session(&session_id)
        .ok_or_else(|| ApiError(DomainError::Conflict("no plugin submission on record for this session".into())))?;
    let character_name = data
        .get("character_name")
        .and_then(|v| v.as_str())
        .unwrap_or(&character_name_key)
        .to_string();

    state
        .sessions
        .dispatch_reinitialize_from_plugin_data(session_id, character_name, data);

    Ok(Json(AckResponse {
        success: true,
        message: "reinitialize queued".to_string(),
    }))
}

/// `POST /tavern/sessions/{id}/request_reinitialize`: arms
/// `pending_coordinated_reinits` and pushes `request_character_submission`
/// over the session's bound socket.
pub async fn request_reinitialize(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult<Json<AckResponse>> {
    require_tavern_mode(state.sessions.tavern_mode_active())?;

    if !state.sessions.coordinated_reinit(&session_id).await {
        return Err(ApiError(DomainError::Conflict(
            "no active plugin socket bound to this session".into(),
        )));
    }

    Ok(Json(AckResponse {
        success: true,
        message: "character submission requested".to_string(),
    }))
}

/// `POST /tavern/submit_character`: feeds `SessionManager::submit_character`,
/// completing a pending coordinated reinit if one matches.
pub async fn submit_character(State(state): State<AppState>, Json(req): Json<SubmitCharacterRequest>) -> ApiResult<Json<AckResponse>> {
    require_tavern_mode(state.sessions.tavern_mode_active())?;

    state
        .sessions
        .submit_character(req.character_id, req.character_name, req.character_data);

    Ok(Json(AckResponse {
        success: true,
        message: "character submission accepted".to_string(),
    }))
}

pub async fn available_characters(State(state): State<AppState>) -> ApiResult<Json<AvailableCharactersResponse>> {
    require_tavern_mode(state.sessions.tavern_mode_active())?;
    Ok(Json(AvailableCharactersResponse {
        characters: state.sessions.storage().list_characters(),
    }))
}

/// `GET /tavern/current_session`: the most recently updated registered
/// `tavern::*` character mapping with a live in-memory session.
pub async fn current_session(State(state): State<AppState>) -> ApiResult<Json<CurrentSessionResponse>> {
    require_tavern_mode(state.sessions.tavern_mode_active())?;

    let mut entries = state.sessions.storage().list_sessions();
    entries.sort_by_key(|e| e.updated_at);

    let Some(latest) = entries.into_iter().rev().find(|e| e.character_mapping_key.starts_with("tavern::")) else {
        return Ok(Json(CurrentSessionResponse {
            has_session: false,
            session_id: None,
            graph_nodes: None,
            graph_edges: None,
        }));
    };

    let stats = state.sessions.get(&latest.session_id).map(|engine| engine.stats());

    Ok(Json(CurrentSessionResponse {
        has_session: true,
        session_id: Some(latest.session_id),
        graph_nodes: stats.as_ref().map(|s| s.nodes),
        graph_edges: stats.as_ref().map(|s| s.edges),
    }))
}
