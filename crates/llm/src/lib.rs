pub mod auth;
pub mod delta;
pub mod http_gateway;
pub mod local_rule_extractor;
pub mod perception;
pub mod traits;
pub mod update_agent;
pub mod validation;
pub(crate) mod util;

pub use delta::{
    BootstrapEntity, BootstrapRelationship, CharacterBootstrap, Delta, DeletionType, EdgeAdd,
    EdgeDelete, NodeDelete, NodeUpdate,
};
pub use http_gateway::HttpLlmGateway;
pub use local_rule_extractor::LocalRuleExtractor;
pub use perception::{PerceptionExtractor, PerceptionStats};
pub use traits::{GenerateRequest, LLMGateway};
pub use update_agent::{CardBootstrapper, DeltaExtractor, LlmUpdateAgent};
pub use validation::{ValidationCounters, ValidationLayer};
