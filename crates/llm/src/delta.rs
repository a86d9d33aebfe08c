//! Shared delta schema produced by both [`crate::update_agent::LlmUpdateAgent`]
//! and [`crate::local_rule_extractor::LocalRuleExtractor`] (§4.4#2 / §4.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Delta {
    #[serde(default)]
    pub nodes_to_update: Vec<NodeUpdate>,
    #[serde(default)]
    pub edges_to_add: Vec<EdgeAdd>,
    #[serde(default)]
    pub nodes_to_delete: Vec<NodeDelete>,
    #[serde(default)]
    pub edges_to_delete: Vec<EdgeDelete>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_id: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub attributes: std::collections::HashMap<String, nm_graph::AttributeValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeAdd {
    pub source: String,
    pub target: String,
    pub relationship: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionType {
    Death,
    Lost,
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDelete {
    pub node_id: String,
    pub deletion_type: DeletionType,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDelete {
    pub source: String,
    pub target: String,
    pub relationship: String,
    #[serde(default)]
    pub reason: String,
}

/// Bootstrap output of a character-card ingestion (§4.4#1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterBootstrap {
    pub main_character: String,
    #[serde(default)]
    pub entities: Vec<BootstrapEntity>,
    #[serde(default)]
    pub relationships: Vec<BootstrapRelationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: std::collections::HashMap<String, nm_graph::AttributeValue>,
}

/// Relation endpoints here are display names, resolved to canonical ids by
/// the caller once all entities in the same payload are known (§4.4#1
/// contract: "relation endpoints MUST be names present in the same payload").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRelationship {
    pub source: String,
    pub target: String,
    pub relationship: String,
}
