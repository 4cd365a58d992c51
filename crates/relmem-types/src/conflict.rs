//! Detected conflicts between memory entries.

use serde::{Deserialize, Serialize};

use crate::ids::{ConflictId, EntryId};
use crate::{Timestamp, now};

/// How the conflict was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Same claim key, different claim value (structural detection).
    ClaimMismatch,
    /// Model-detected contradiction in free text (semantic scan).
    SemanticContradiction,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaimMismatch => "claim_mismatch",
            Self::SemanticContradiction => "semantic_contradiction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "claim_mismatch" => Some(Self::ClaimMismatch),
            "semantic_contradiction" => Some(Self::SemanticContradiction),
            _ => None,
        }
    }
}

/// Lifecycle state of a conflict. Resolved and Ignored are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    Resolved,
    Ignored,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }

    /// Whether the conflict can no longer change state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A detected inconsistency between two entries.
///
/// The pair is held in canonical order (`entry_a < entry_b`) so detection
/// direction never produces duplicate rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConflict {
    pub id: ConflictId,
    pub entry_a: EntryId,
    pub entry_b: EntryId,
    pub conflict_type: ConflictType,
    pub status: ConflictStatus,
    /// The entry chosen as the winner when resolved.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resolution_entry_id: Option<EntryId>,
    pub detected_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resolved_at: Option<Timestamp>,
    /// Actor that resolved or ignored the conflict.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resolved_by: Option<String>,
    /// Reason recorded when the conflict is ignored.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
}

impl MemoryConflict {
    /// Create a pending conflict between two entries, canonically ordered.
    pub fn between(a: EntryId, b: EntryId, conflict_type: ConflictType) -> Self {
        let (entry_a, entry_b) = if a < b { (a, b) } else { (b, a) };
        Self {
            id: ConflictId::new(),
            entry_a,
            entry_b,
            conflict_type,
            status: ConflictStatus::Pending,
            resolution_entry_id: None,
            detected_at: now(),
            resolved_at: None,
            resolved_by: None,
            note: None,
        }
    }

    /// Whether the given entry is one of the conflicting pair.
    pub fn involves(&self, id: EntryId) -> bool {
        self.entry_a == id || self.entry_b == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_ordering() {
        let a = EntryId::new();
        let b = EntryId::new();

        let c1 = MemoryConflict::between(a, b, ConflictType::ClaimMismatch);
        let c2 = MemoryConflict::between(b, a, ConflictType::ClaimMismatch);

        assert_eq!(c1.entry_a, c2.entry_a);
        assert_eq!(c1.entry_b, c2.entry_b);
        assert!(c1.entry_a < c1.entry_b);
    }

    #[test]
    fn test_involves() {
        let a = EntryId::new();
        let b = EntryId::new();
        let c = MemoryConflict::between(a, b, ConflictType::SemanticContradiction);
        assert!(c.involves(a));
        assert!(c.involves(b));
        assert!(!c.involves(EntryId::new()));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ConflictStatus::Pending.is_terminal());
        assert!(ConflictStatus::Resolved.is_terminal());
        assert!(ConflictStatus::Ignored.is_terminal());
    }
}
