//! Entity tags: deduplicated real-world things mentioned across entries.

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;
use crate::{Timestamp, now};

/// Closed set of entity types recognized by the extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Product,
    Metric,
    Event,
    Concept,
    Location,
    Technology,
}

impl EntityType {
    /// String form used in the database and in LLM prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Product => "product",
            Self::Metric => "metric",
            Self::Event => "event",
            Self::Concept => "concept",
            Self::Location => "location",
            Self::Technology => "technology",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "person" => Some(Self::Person),
            "organization" => Some(Self::Organization),
            "product" => Some(Self::Product),
            "metric" => Some(Self::Metric),
            "event" => Some(Self::Event),
            "concept" => Some(Self::Concept),
            "location" => Some(Self::Location),
            "technology" => Some(Self::Technology),
            _ => None,
        }
    }

    /// All entity types, in prompt order.
    pub fn all() -> &'static [EntityType] {
        &[
            Self::Person,
            Self::Organization,
            Self::Product,
            Self::Metric,
            Self::Event,
            Self::Concept,
            Self::Location,
            Self::Technology,
        ]
    }
}

/// Normalize an entity display name into its dedup key.
///
/// Lowercased, trimmed, internal whitespace collapsed to single spaces.
pub fn normalize_entity_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A deduplicated entity, unique on `(normalized_name, entity_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTag {
    pub id: EntityId,
    /// Display name as first seen.
    pub name: String,
    /// Dedup key derived from the name.
    pub normalized_name: String,
    pub entity_type: EntityType,
    /// How many entries mention this entity.
    pub mention_count: u32,
    pub confidence: f32,
    pub created_at: Timestamp,
}

impl EntityTag {
    /// Create a tag for a fresh mention.
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence: f32) -> Self {
        let name = name.into();
        Self {
            id: EntityId::new(),
            normalized_name: normalize_entity_name(&name),
            name,
            entity_type,
            mention_count: 1,
            confidence,
            created_at: now(),
        }
    }
}

/// One entity mention produced by an extractor, before dedup against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: f32,
}

impl EntityMention {
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence: f32) -> Self {
        Self {
            name: name.into(),
            entity_type,
            confidence,
        }
    }

    /// The dedup key for this mention.
    pub fn normalized_name(&self) -> String {
        normalize_entity_name(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_entity_name() {
        assert_eq!(normalize_entity_name("  PostgreSQL  "), "postgresql");
        assert_eq!(normalize_entity_name("Acme   Corp"), "acme corp");
        assert_eq!(normalize_entity_name("ACME corp"), "acme corp");
    }

    #[test]
    fn test_entity_type_round_trip() {
        for ty in EntityType::all() {
            assert_eq!(EntityType::parse(ty.as_str()), Some(*ty));
        }
        assert_eq!(EntityType::parse("widget"), None);
    }

    #[test]
    fn test_entity_tag_normalizes_on_construction() {
        let tag = EntityTag::new("Acme  Corp", EntityType::Organization, 0.8);
        assert_eq!(tag.name, "Acme  Corp");
        assert_eq!(tag.normalized_name, "acme corp");
        assert_eq!(tag.mention_count, 1);
    }
}
