//! `POST /initialize`, `POST /initialize_async`, `GET /initialize_status/{task_id}`.

use axum::extract::{Path, State};
use axum::Json;

use nm_domain::error::Error as DomainError;
use nm_protocol::{GraphStats, InitializeAsyncResponse, InitializeRequest, InitializeResponse};
use nm_session::{AsyncInitTask, CharacterCard};

use crate::api::error::{ApiError, ApiResult};
use crate::api::util::character_mapping_key;
use crate::state::AppState;

fn card_from_dto(dto: nm_protocol::CharacterCardDto) -> CharacterCard {
    CharacterCard {
        name: dto.name,
        description: dto.description,
        personality: dto.personality,
        scenario: dto.scenario,
    }
}

async fn resolve_session_id(state: &AppState, req: &InitializeRequest, mapping_key: &str) -> ApiResult<String> {
    match &req.session_id {
        Some(id) => Ok(id.clone()),
        None => Ok(state.sessions.storage().register_character(mapping_key)?.session_id),
    }
}

/// §6.1 `POST /initialize`. Idempotent: a session whose graph is already
/// populated returns its existing stats without re-bootstrapping.
pub async fn initialize(State(state): State<AppState>, Json(req): Json<InitializeRequest>) -> ApiResult<Json<InitializeResponse>> {
    let mapping_key = character_mapping_key(&req.character_card.name);
    let session_id = resolve_session_id(&state, &req, &mapping_key).await?;

    let engine = state.sessions.get_or_create(&session_id, &mapping_key, req.is_test).await?;
    let card = card_from_dto(req.character_card);
    let outcome = engine.initialize_from_character(&card, &req.world_info).await?;
    let stats = engine.stats();

    Ok(Json(InitializeResponse {
        session_id,
        message: format!("session initialized via {} bootstrap", outcome.method),
        graph_stats: GraphStats {
            nodes: stats.nodes,
            edges: stats.edges,
        },
    }))
}

/// §6.1 `POST /initialize_async`. Runs bootstrap on a background worker;
/// progress is polled via `GET /initialize_status/{task_id}`.
pub async fn initialize_async(
    State(state): State<AppState>,
    Json(req): Json<InitializeRequest>,
) -> ApiResult<Json<InitializeAsyncResponse>> {
    let mapping_key = character_mapping_key(&req.character_card.name);
    let session_id = resolve_session_id(&state, &req, &mapping_key).await?;
    let card = card_from_dto(req.character_card);

    let task_id = state
        .sessions
        .initialize_async(session_id, mapping_key, card, req.world_info, req.is_test);

    Ok(Json(InitializeAsyncResponse {
        task_id,
        message: "bootstrap queued".to_string(),
        estimated_time: 5,
    }))
}

/// §6.1 `GET /initialize_status/{task_id}`.
pub async fn initialize_status(State(state): State<AppState>, Path(task_id): Path<String>) -> ApiResult<Json<AsyncInitTask>> {
    state
        .sessions
        .get_task(&task_id)
        .map(Json)
        .ok_or_else(|| ApiError(DomainError::NotFound(format!("no init task {task_id}"))))
}
