/// Shared error type used across all narrative-memory crates.
///
/// Variants map onto the external boundary's error kinds (see
/// `nm_domain::error::Error::status_label`); everything else is `Internal`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("LLM provider: {0}")]
    Llm(#[from] LlmError),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("graph: {0}")]
    Graph(#[from] GraphError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure classification for `LLMGateway::generate` (§4.3).
///
/// Never causes a turn to be dropped: callers always have a fallback
/// (the rule extractor) that yields *some* delta.
#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("request exceeded its deadline")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("response was not valid JSON in JSON mode: {0}")]
    Format(String),
}

/// KnowledgeGraph mutation failures (§4.1).
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("edge endpoint missing: {0}")]
    MissingEndpoint(String),
    #[error("storage error: {0}")]
    Storage(String),
}
