use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// auth — process-local trust boundary for the HTTP + socket surface
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A process-local bearer token, not a client identity system: plugin
/// clients are trusted once they hold the token, with no per-client
/// identity or authorization model on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayAuthConfig {
    /// Env var holding the API bearer token. Unset => endpoints that would
    /// normally require it are open (dev mode).
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    /// Env var holding the admin bearer token (`/system/*` reset endpoints).
    #[serde(default = "d_admin_token_env")]
    pub admin_token_env: String,
}

impl Default for GatewayAuthConfig {
    fn default() -> Self {
        Self {
            api_token_env: d_api_token_env(),
            admin_token_env: d_admin_token_env(),
        }
    }
}

fn d_api_token_env() -> String {
    "NM_API_TOKEN".into()
}
fn d_admin_token_env() -> String {
    "NM_ADMIN_TOKEN".into()
}
