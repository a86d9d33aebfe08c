//! OpenAI-compatible HTTP implementation of [`LLMGateway`].
//!
//! Works with OpenAI, Azure OpenAI-compatible endpoints, Ollama, vLLM, and
//! anything else speaking the `/chat/completions` wire format.

use std::time::Duration;

use nm_domain::config::LlmConfig;
use nm_domain::error::LlmError;
use serde_json::Value;

use crate::auth::AuthRotator;
use crate::traits::{GenerateRequest, LLMGateway};
use crate::util::from_reqwest;

pub struct HttpLlmGateway {
    base_url: String,
    model: String,
    auth: AuthRotator,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpLlmGateway {
    pub fn from_config(cfg: &LlmConfig) -> nm_domain::error::Result<Self> {
        let auth = AuthRotator::from_auth_config(&cfg.auth)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            auth,
            client,
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
        })
    }

    fn build_body(&self, req: &GenerateRequest<'_>) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = req.system_message {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": req.prompt}));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait::async_trait]
impl LLMGateway for HttpLlmGateway {
    async fn generate(&self, req: GenerateRequest<'_>) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&req);
        let key = self.auth.next_key();

        tracing::debug!(url = %url, json_mode = req.json_mode, "llm generate request");

        let send = self
            .client
            .post(&url)
            .bearer_auth(&key.key)
            .json(&body)
            .send();

        let resp = match tokio::time::timeout(self.request_timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                self.auth.mark_failed(key.index);
                return Err(LlmError::Transport(e.to_string()));
            }
            Err(_) => {
                self.auth.mark_failed(key.index);
                return Err(LlmError::Timeout);
            }
        };

        let status = resp.status();
        let text = tokio::time::timeout(self.request_timeout, resp.text())
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !status.is_success() {
            self.auth.mark_failed(key.index);
            return Err(LlmError::Transport(format!("HTTP {} - {text}", status.as_u16())));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| LlmError::Format(e.to_string()))?;
        let content = parsed
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| LlmError::Format("missing choices[0].message.content".into()))?
            .to_string();

        if req.json_mode && serde_json::from_str::<Value>(&content).is_err() {
            return Err(LlmError::Format("response body is not valid JSON".into()));
        }

        Ok(content)
    }
}
