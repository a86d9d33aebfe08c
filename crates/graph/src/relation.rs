use serde::{Deserialize, Serialize};

use crate::entity::AttributeMap;

/// A directed, typed edge between two entities. Multiple edges between
/// the same pair are allowed iff they carry distinct `relationship` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub source_id: String,
    pub target_id: String,
    pub relationship: String,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl Relation {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, relationship: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship: relationship.into(),
            attributes: AttributeMap::new(),
        }
    }

    /// Matches a delete-edge pattern, where `"*"` is a wildcard for any field.
    pub fn matches_pattern(&self, source: &str, target: &str, relationship: &str) -> bool {
        (source == "*" || self.source_id == source)
            && (target == "*" || self.target_id == target)
            && (relationship == "*" || self.relationship == relationship)
    }
}
