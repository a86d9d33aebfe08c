use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use nm_domain::config::{Config, ConfigSeverity, CorsConfig};
use nm_gateway::cli::{Cli, Command, ConfigCommand};
use nm_gateway::state::AppState;
use nm_gateway::{api, cli};
use nm_llm::{CardBootstrapper, DeltaExtractor, HttpLlmGateway, LlmUpdateAgent};
use nm_memory::StorageManager;
use nm_session::{ChannelRegistry, SessionManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli_args = Cli::parse();

    match cli_args.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config()?;
            cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("echograph {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing, only initialized for the `serve` command.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,nm_gateway=debug")))
        .json()
        .init();
}

/// Starts the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!(service = %config.observability.service_name, "narrative-memory gateway starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Storage ──────────────────────────────────────────────────────
    let storage = Arc::new(StorageManager::new(&config.memory.state_root).context("initializing storage manager")?);
    tracing::info!(path = %config.memory.state_root.display(), "storage manager ready");

    // ── LLM bootstrapper + delta extractor ──────────────────────────
    let (bootstrapper, agent): (Option<Arc<dyn CardBootstrapper>>, Option<Arc<dyn DeltaExtractor>>) = if config.llm.enabled {
        let gateway = HttpLlmGateway::from_config(&config.llm).context("initializing LLM gateway")?;
        let update_agent = Arc::new(LlmUpdateAgent::new(gateway, config.llm.max_tokens, config.llm.temperature));
        tracing::info!(base_url = %config.llm.base_url, model = %config.llm.model, "LLM gateway ready");
        (Some(update_agent.clone() as Arc<dyn CardBootstrapper>), Some(update_agent as Arc<dyn DeltaExtractor>))
    } else {
        tracing::warn!("llm.enabled is false — bootstrap and extraction always fall back to local paths");
        (None, None)
    };

    // ── Session management ──────────────────────────────────────────
    let channels = Arc::new(ChannelRegistry::new());
    let sessions = Arc::new(SessionManager::new(storage.clone(), channels.clone(), config.sliding_window.clone(), bootstrapper, agent));
    tracing::info!("session manager ready");

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = read_token_hash(&config.auth.api_token_env, "API");
    let admin_token_hash = read_token_hash(&config.auth.admin_token_env, "admin");

    let state = AppState {
        config: config.clone(),
        sessions,
        channels,
        api_token_hash,
        admin_token_hash,
    };

    // ── CORS layer (config-aware) ────────────────────────────────────
    let cors_layer = build_cors_layer(&config.api_server.cors);

    // ── Concurrency limit (backpressure protection) ─────────────────
    let max_concurrent = std::env::var("NM_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "narrative-memory gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

fn read_token_hash(env_var: &str, label: &str) -> Option<Vec<u8>> {
    match std::env::var(env_var) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var, "{label} bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(env_var, "{label} bearer-token auth DISABLED — set {env_var} to enable");
            None
        }
    }
}

/// Builds a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may carry a trailing `*` wildcard for the port segment (e.g.
/// `http://localhost:*`), expanded into a predicate matching any port on
/// that host. A literal `"*"` allows all origins (not recommended for
/// production).
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
