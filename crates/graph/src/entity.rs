use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of thing an [`Entity`](crate::Entity) represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Character,
    Location,
    Item,
    Event,
    Concept,
    Organization,
    Skill,
    Unknown,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Character => "character",
            EntityType::Location => "location",
            EntityType::Item => "item",
            EntityType::Event => "event",
            EntityType::Concept => "concept",
            EntityType::Organization => "organization",
            EntityType::Skill => "skill",
            EntityType::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "character" => EntityType::Character,
            "location" => EntityType::Location,
            "item" => EntityType::Item,
            "event" => EntityType::Event,
            "concept" => EntityType::Concept,
            "organization" => EntityType::Organization,
            "skill" => EntityType::Skill,
            _ => EntityType::Unknown,
        })
    }
}

/// A typed attribute value. Modeled as a closed union rather than an
/// arbitrary JSON object so persistence can enumerate supported scalar
/// kinds (§9 redesign flag: "dynamic attribute bags").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

pub type AttributeMap = HashMap<String, AttributeValue>;

/// Lowercase + spaces-to-underscores normalization, used to build
/// canonical entity ids (`<type>_<normalize(name)>`, invariant 1 in §8).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Build the canonical id for an entity of a given type and display name.
pub fn canonical_id(entity_type: EntityType, name: &str) -> String {
    format!("{}_{}", entity_type.as_str(), normalize_name(name))
}

/// A node in the [`KnowledgeGraph`](crate::KnowledgeGraph).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deletion_reason: Option<String>,
    pub created_time: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Entity {
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: canonical_id(entity_type, &name),
            entity_type,
            name,
            description: String::new(),
            attributes: AttributeMap::new(),
            is_deleted: false,
            deletion_reason: None,
            created_time: now,
            last_modified: now,
        }
    }
}
