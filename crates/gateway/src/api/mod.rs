pub mod error;
pub mod init;
pub mod session;
pub mod system;
pub mod tavern;
pub mod util;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Builds the full API router (§6.1, §6.2).
///
/// Routes split into three tiers:
/// - **public** — no auth (liveness probe)
/// - **protected** — gated behind `require_api_token`
/// - **admin** — gated behind `require_admin_token` (tavern-mode toggle,
///   full/quick reset)
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/system/liveness", get(system::liveness));

    let protected = Router::new()
        .route("/initialize", post(init::initialize))
        .route("/initialize_async", post(init::initialize_async))
        .route("/initialize_status/:task_id", get(init::initialize_status))
        .route("/enhance_prompt", post(session::enhance_prompt))
        .route("/update_memory", post(session::update_memory))
        .route("/process_conversation", post(session::process_conversation))
        .route("/sync_conversation", post(session::sync_conversation))
        .route("/sessions/:id/stats", get(session::session_stats))
        .route("/sessions/:id/reset", post(session::reset_session))
        .route("/sessions/:id/clear", post(session::clear_session))
        .route("/sessions/:id/reinitialize", post(session::reinitialize_session))
        .route("/system/tavern_mode", get(system::get_tavern_mode))
        .route(
            "/tavern/sessions/:id/reinitialize_from_plugin",
            post(tavern::reinitialize_from_plugin),
        )
        .route(
            "/tavern/sessions/:id/request_reinitialize",
            post(tavern::request_reinitialize),
        )
        .route("/tavern/submit_character", post(tavern::submit_character))
        .route("/tavern/available_characters", get(tavern::available_characters))
        .route("/tavern/current_session", get(tavern::current_session))
        .route("/ws/tavern/:session_id", get(crate::ws::tavern_ws))
        .route_layer(middleware::from_fn_with_state(state.clone(), crate::auth::require_api_token));

    let admin = Router::new()
        .route("/system/tavern_mode", post(system::set_tavern_mode))
        .route("/system/full_reset", post(system::full_reset))
        .route("/system/quick_reset", get(system::quick_reset))
        .route_layer(middleware::from_fn_with_state(state, crate::auth::require_admin_token));

    public
        .merge(protected)
        .merge(admin)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
