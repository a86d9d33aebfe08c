mod auth;
mod llm;
mod memory;
mod observability;
mod server;
mod sliding_window;

pub use auth::*;
pub use llm::*;
pub use memory::*;
pub use observability::*;
pub use server::*;
pub use sliding_window::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sliding_window: SlidingWindowConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub api_server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.api_server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "api_server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.api_server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "api_server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.llm.enabled && self.llm.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.base_url".into(),
                message: "llm is enabled but base_url is empty — bootstrap and extraction will always fall back to the local paths".into(),
            });
        }

        if !self.llm.base_url.is_empty()
            && !self.llm.base_url.starts_with("http://")
            && !self.llm.base_url.starts_with("https://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: format!(
                    "base_url must start with http:// or https:// (got \"{}\")",
                    self.llm.base_url
                ),
            });
        }

        if self.sliding_window.window_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sliding_window.window_size".into(),
                message: "window_size must be greater than 0".into(),
            });
        }

        if self.sliding_window.processing_delay >= self.sliding_window.window_size {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "sliding_window.processing_delay".into(),
                message: "processing_delay >= window_size means a turn can be evicted before it ever becomes a target".into(),
            });
        }

        if self.api_server.cors.allowed_origins.len() == 1
            && self.api_server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "api_server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            api_server: ServerConfig {
                port: 9543,
                host: "127.0.0.1".into(),
                ..ServerConfig::default()
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".into(),
                ..LlmConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.api_server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "api_server.port").expect("expected port error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn llm_base_url_invalid_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.llm.base_url = "ftp://localhost:5000".into();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.base_url").expect("expected base_url error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn llm_disabled_with_empty_base_url_is_fine() {
        let mut cfg = valid_config();
        cfg.llm.base_url = String::new();
        cfg.llm.enabled = false;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "llm.base_url").is_none());
    }

    #[test]
    fn processing_delay_past_window_is_warning() {
        let mut cfg = valid_config();
        cfg.sliding_window.window_size = 2;
        cfg.sliding_window.processing_delay = 5;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "sliding_window.processing_delay")
            .expect("expected processing_delay warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn window_size_zero_is_error() {
        let mut cfg = valid_config();
        cfg.sliding_window.window_size = 0;
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "sliding_window.window_size").expect("expected window_size error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.api_server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "api_server.cors.allowed_origins")
            .expect("expected CORS wildcard warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "api_server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(
            format!("{err}"),
            "[ERROR] api_server.port: port must be greater than 0"
        );
    }
}
