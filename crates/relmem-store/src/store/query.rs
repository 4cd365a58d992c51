//! Query parameter and result types for the store.

use relmem_types::{ConflictStatus, ConflictType, EntryId, MemoryEntry, Scope};
use serde::{Deserialize, Serialize};

/// Read-side visibility predicate, supplied by the surrounding application.
///
/// Tenant is mandatory. Department and role narrow visibility: entries
/// carrying a department/role are only visible when the filter supplies a
/// matching one; entries without are visible to the whole tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeFilter {
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
}

impl ScopeFilter {
    /// Tenant-wide filter.
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            department: None,
            role: None,
        }
    }

    /// Filter matching everything a given scope's writer can see.
    pub fn from_scope(scope: &Scope) -> Self {
        Self {
            tenant_id: scope.tenant_id.clone(),
            department: scope.department.clone(),
            role: scope.role.clone(),
        }
    }

    /// Whether an entry's scope is visible under this filter.
    pub fn allows(&self, scope: &Scope) -> bool {
        if scope.tenant_id != self.tenant_id {
            return false;
        }
        if let Some(dept) = &scope.department {
            if self.department.as_deref() != Some(dept.as_str()) {
                return false;
            }
        }
        if let Some(role) = &scope.role {
            if self.role.as_deref() != Some(role.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Filter for conflict listing.
#[derive(Debug, Clone, Default)]
pub struct ConflictFilter {
    pub status: Option<ConflictStatus>,
    pub conflict_type: Option<ConflictType>,
    pub limit: usize,
    pub offset: usize,
}

impl ConflictFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            conflict_type: None,
            limit: 50,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: ConflictStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, conflict_type: ConflictType) -> Self {
        self.conflict_type = Some(conflict_type);
        self
    }

    pub fn paged(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// An entry together with its cosine similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarEntry {
    pub entry: MemoryEntry,
    /// `1 - cosine_distance`, higher is more similar.
    pub similarity: f32,
}

/// A single differing field between two versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub field: String,
    pub left: Option<String>,
    pub right: Option<String>,
}

/// Database statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub entry_count: usize,
    pub entity_count: usize,
    pub relation_count: usize,
    pub conflict_count: usize,
    pub pending_job_count: usize,
    pub embedding_count: usize,
    pub schema_version: i32,
    pub embedding_dimensions: usize,
}

/// Claim-mismatch hit: another latest entry with the same claim key but a
/// different value.
#[derive(Debug, Clone)]
pub struct ClaimMismatch {
    pub other_id: EntryId,
    pub other_value: String,
}
