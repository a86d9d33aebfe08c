//! LLMUpdateAgent (§4.4): character-card bootstrap and per-turn delta
//! extraction, both backed by one [`LLMGateway`].

use async_trait::async_trait;
use nm_domain::error::LlmError;

use crate::delta::{CharacterBootstrap, Delta};
use crate::traits::{GenerateRequest, LLMGateway};

/// Common contract for anything that can turn a completed turn into a
/// [`Delta`] (§4.4#2 / §4.5). The coordinator tries an `LlmUpdateAgent`
/// first and falls back to `LocalRuleExtractor` on any `Err`.
#[async_trait]
pub trait DeltaExtractor: Send + Sync {
    async fn extract(
        &self,
        user_text: &str,
        assistant_text: &str,
        graph_snapshot: &str,
        recent_context: &str,
    ) -> Result<Delta, LlmError>;
}

/// Type-erased bootstrap contract (§4.4#1), separated from [`DeltaExtractor`]
/// since bootstrap and per-turn extraction are invoked at different points
/// in a session's lifecycle and a caller may want to hold only one as a
/// trait object.
#[async_trait]
pub trait CardBootstrapper: Send + Sync {
    async fn bootstrap(
        &self,
        character_card: &str,
        world_book: &str,
    ) -> Result<CharacterBootstrap, LlmError>;
}

pub struct LlmUpdateAgent<G: LLMGateway> {
    gateway: G,
    max_tokens: u32,
    temperature: f32,
}

impl<G: LLMGateway> LlmUpdateAgent<G> {
    pub fn new(gateway: G, max_tokens: u32, temperature: f32) -> Self {
        Self {
            gateway,
            max_tokens,
            temperature,
        }
    }

    /// Character-card bootstrap (§4.4#1). On invalid JSON the caller is
    /// expected to fall back to a minimal single-entity bootstrap — this
    /// method itself only classifies the failure, it does not fall back.
    pub async fn bootstrap(
        &self,
        character_card: &str,
        world_book: &str,
    ) -> Result<CharacterBootstrap, LlmError> {
        let system = "You extract a structured knowledge graph seed from a \
            roleplay character card and world book. Respond with JSON only, \
            matching: {\"main_character\": string, \"entities\": \
            [{\"name\": string, \"type\": string, \"description\": string, \
            \"attributes\": object}], \"relationships\": [{\"source\": string, \
            \"target\": string, \"relationship\": string}]}. Every source/target \
            in relationships MUST be a name present in entities or equal to \
            main_character.";
        let prompt = format!("CHARACTER CARD:\n{character_card}\n\nWORLD BOOK:\n{world_book}");

        let raw = self
            .gateway
            .generate(GenerateRequest {
                prompt: &prompt,
                system_message: Some(system),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                json_mode: true,
            })
            .await?;

        serde_json::from_str(&raw).map_err(|e| LlmError::Format(e.to_string()))
    }
}

#[async_trait]
impl<G: LLMGateway> CardBootstrapper for LlmUpdateAgent<G> {
    async fn bootstrap(
        &self,
        character_card: &str,
        world_book: &str,
    ) -> Result<CharacterBootstrap, LlmError> {
        LlmUpdateAgent::bootstrap(self, character_card, world_book).await
    }
}

#[async_trait]
impl<G: LLMGateway> DeltaExtractor for LlmUpdateAgent<G> {
    async fn extract(
        &self,
        user_text: &str,
        assistant_text: &str,
        graph_snapshot: &str,
        recent_context: &str,
    ) -> Result<Delta, LlmError> {
        let system = "You maintain a narrative knowledge graph incrementally. \
            Given the current graph snapshot, recent context, and the newest \
            turn, respond with JSON only matching: {\"nodes_to_update\": \
            [{\"node_id\": string, \"type\": string?, \"attributes\": object}], \
            \"edges_to_add\": [{\"source\": string, \"target\": string, \
            \"relationship\": string}], \"nodes_to_delete\": [{\"node_id\": \
            string, \"deletion_type\": \"death\"|\"lost\"|\"default\", \
            \"reason\": string}], \"edges_to_delete\": [{\"source\": string, \
            \"target\": string, \"relationship\": string, \"reason\": string}]}. \
            \"*\" is allowed in edges_to_delete fields as a wildcard. Omit a \
            field entirely if there is no change; never invent entities that \
            cannot be inferred from the turn.";

        let prompt = format!(
            "GRAPH SNAPSHOT:\n{graph_snapshot}\n\nRECENT CONTEXT:\n{recent_context}\n\n\
             NEW TURN:\nUser: {user_text}\nAssistant: {assistant_text}"
        );

        let raw = self
            .gateway
            .generate(GenerateRequest {
                prompt: &prompt,
                system_message: Some(system),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                json_mode: true,
            })
            .await?;

        serde_json::from_str(&raw).map_err(|e| LlmError::Format(e.to_string()))
    }
}
