//! Memory entries and version lineage.

use serde::{Deserialize, Serialize};

use crate::ids::EntryId;
use crate::{Timestamp, now};

/// The owning scope of a memory entry.
///
/// Entries are partitioned by tenant; department and role are optional
/// finer-grained read filters applied by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
}

impl Scope {
    /// Create a tenant-only scope.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            department: None,
            role: None,
        }
    }

    /// Restrict the scope to a department.
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Restrict the scope to a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Kind of content a memory entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Fact,
    Observation,
    Decision,
    Conversation,
    Document,
    Insight,
}

impl ContentType {
    /// String form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Observation => "observation",
            Self::Decision => "decision",
            Self::Conversation => "conversation",
            Self::Document => "document",
            Self::Insight => "insight",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(Self::Fact),
            "observation" => Some(Self::Observation),
            "decision" => Some(Self::Decision),
            "conversation" => Some(Self::Conversation),
            "document" => Some(Self::Document),
            "insight" => Some(Self::Insight),
            _ => None,
        }
    }
}

/// One stored memory: the unit of knowledge.
///
/// Entries are never mutated in place. An edit creates a new entry whose
/// `parent_id` points at the previous version and whose `root_id` names the
/// logical fact; exactly one entry per root has `is_latest = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: EntryId,
    pub content: String,
    pub content_type: ContentType,
    /// Confidence in [0, 1]; the base of the quality score.
    pub confidence: f32,
    pub scope: Scope,
    /// Structured-fact key, e.g. `"db_engine"`. Always paired with a value.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub claim_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub claim_value: Option<String>,
    pub created_at: Timestamp,
    /// Identifier of the agent that wrote this entry.
    pub created_by: String,
    pub access_count: u32,
    pub last_accessed: Timestamp,
    /// Previous version, None for the root of a lineage.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_id: Option<EntryId>,
    /// Shared by every version of the same logical fact.
    pub root_id: EntryId,
    pub is_latest: bool,
}

impl MemoryEntry {
    /// Create a new root entry (its own lineage root, latest by definition).
    pub fn new(
        content_type: ContentType,
        content: impl Into<String>,
        confidence: f32,
        scope: Scope,
    ) -> Self {
        let id = EntryId::new();
        let created_at = now();
        Self {
            id,
            content: content.into(),
            content_type,
            confidence,
            scope,
            claim_key: None,
            claim_value: None,
            created_at,
            created_by: "unknown".to_string(),
            access_count: 0,
            last_accessed: created_at,
            parent_id: None,
            root_id: id,
            is_latest: true,
        }
    }

    /// Attach a structured claim for exact conflict detection.
    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.claim_key = Some(key.into());
        self.claim_value = Some(value.into());
        self
    }

    /// Record the creating agent.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.created_by = agent.into();
        self
    }

    /// Create the next version of an existing entry.
    ///
    /// The new entry inherits the parent's root and points its `parent_id`
    /// at it. Flipping the parent's `is_latest` is the store's job, atomic
    /// with the insert.
    pub fn new_version(parent: &MemoryEntry, content: impl Into<String>, confidence: f32) -> Self {
        let id = EntryId::new();
        let created_at = now();
        Self {
            id,
            content: content.into(),
            content_type: parent.content_type,
            confidence,
            scope: parent.scope.clone(),
            claim_key: parent.claim_key.clone(),
            claim_value: parent.claim_value.clone(),
            created_at,
            created_by: parent.created_by.clone(),
            access_count: 0,
            last_accessed: created_at,
            parent_id: Some(parent.id),
            root_id: parent.root_id,
            is_latest: true,
        }
    }

    /// Whether the entry carries a structured claim.
    pub fn has_claim(&self) -> bool {
        self.claim_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_its_own_root() {
        let entry = MemoryEntry::new(
            ContentType::Fact,
            "PostgreSQL is the primary store",
            0.9,
            Scope::new("acme"),
        );
        assert_eq!(entry.root_id, entry.id);
        assert!(entry.parent_id.is_none());
        assert!(entry.is_latest);
    }

    #[test]
    fn test_new_version_inherits_root() {
        let v1 = MemoryEntry::new(ContentType::Fact, "v1", 0.9, Scope::new("acme"))
            .with_claim("db_engine", "PostgreSQL");
        let v2 = MemoryEntry::new_version(&v1, "v2", 0.95);

        assert_eq!(v2.root_id, v1.root_id);
        assert_eq!(v2.parent_id, Some(v1.id));
        assert_ne!(v2.id, v1.id);
        assert_eq!(v2.claim_key.as_deref(), Some("db_engine"));
    }

    #[test]
    fn test_content_type_round_trip() {
        for ct in [
            ContentType::Fact,
            ContentType::Observation,
            ContentType::Decision,
            ContentType::Conversation,
            ContentType::Document,
            ContentType::Insight,
        ] {
            assert_eq!(ContentType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(ContentType::parse("bogus"), None);
    }
}
