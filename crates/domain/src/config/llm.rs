use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// llm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Single-provider LLM configuration (§6.4): one gateway endpoint used by
/// both the bootstrap agent and the per-turn delta extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub auth: AuthConfig,
    /// When false, `SessionEngine` always uses the minimal bootstrap and
    /// the local rule extractor (no outbound calls at all).
    #[serde(default = "d_true")]
    pub enabled: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: d_model(),
            max_tokens: d_max_tokens(),
            temperature: d_temperature(),
            request_timeout_ms: d_request_timeout_ms(),
            auth: AuthConfig::default(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Direct key (for config-only setups; prefer env or keys).
    #[serde(default)]
    pub key: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Multiple env var names for round-robin key rotation.
    /// When non-empty, takes precedence over `env`/`key`.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Keychain service name.
    #[serde(default)]
    pub service: Option<String>,
    /// Keychain account name.
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    Keychain,
    None,
}

fn d_model() -> String {
    "gpt-4o-mini".into()
}
fn d_max_tokens() -> u32 {
    1024
}
fn d_temperature() -> f32 {
    0.2
}
fn d_request_timeout_ms() -> u64 {
    20_000
}
fn d_true() -> bool {
    true
}
