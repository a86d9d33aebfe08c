//! `/system/*`: liveness, tavern-mode toggle, and the reset family (§6.1).

use axum::extract::State;
use axum::Json;

use nm_protocol::{FullResetResponse, LivenessResponse, TavernModeRequest, TavernModeResponse};

use crate::api::error::ApiResult;
use crate::state::AppState;

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_tavern_mode(State(state): State<AppState>) -> Json<TavernModeResponse> {
    Json(TavernModeResponse {
        active: state.sessions.tavern_mode_active(),
    })
}

pub async fn set_tavern_mode(State(state): State<AppState>, Json(req): Json<TavernModeRequest>) -> Json<TavernModeResponse> {
    state.sessions.set_tavern_mode_active(req.active);
    Json(TavernModeResponse { active: req.active })
}

/// §4.12 `full_reset`: closes sockets, drops in-memory sessions, and wipes
/// `is_test` storage.
pub async fn full_reset(State(state): State<AppState>) -> ApiResult<Json<FullResetResponse>> {
    let (sessions_closed, sockets_closed) = state.sessions.full_reset().await?;
    Ok(Json(FullResetResponse { sessions_closed, sockets_closed }))
}

/// §4.12 `quick_reset`: same as `full_reset` minus the storage wipe.
pub async fn quick_reset(State(state): State<AppState>) -> Json<FullResetResponse> {
    let (sessions_closed, sockets_closed) = state.sessions.quick_reset().await;
    Json(FullResetResponse { sessions_closed, sockets_closed })
}
