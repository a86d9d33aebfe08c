use async_trait::async_trait;
use nm_domain::error::LlmError;

/// The single operation an LLM backend must provide (§4.3): a one-shot
/// completion, optionally constrained to JSON output. Implementations never
/// retry internally — retry policy belongs to the caller.
#[async_trait]
pub trait LLMGateway: Send + Sync {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, LlmError>;
}

/// Parameters for one [`LLMGateway::generate`] call.
pub struct GenerateRequest<'a> {
    pub prompt: &'a str,
    pub system_message: Option<&'a str>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// When true, the gateway requests JSON-only output and classifies a
    /// non-JSON body as [`LlmError::Format`].
    pub json_mode: bool,
}

#[async_trait]
impl<T: LLMGateway + ?Sized> LLMGateway for std::sync::Arc<T> {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, LlmError> {
        (**self).generate(request).await
    }
}
