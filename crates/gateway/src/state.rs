use std::sync::Arc;

use nm_domain::config::Config;
use nm_session::{ChannelRegistry, SessionManager};

/// Shared application state passed to all API handlers and the socket
/// endpoint.
///
/// Fields are grouped by concern:
/// - **Core services** — config, session registry, channel registry
/// - **Security** — token hashes computed once at startup
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub channels: Arc<ChannelRegistry>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
    /// SHA-256 hash of the admin bearer token, gating `/system/*` endpoints.
    /// `None` = dev mode (admin endpoints accessible without auth).
    pub admin_token_hash: Option<Vec<u8>>,
}
