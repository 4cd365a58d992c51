//! Enrichment jobs: the durable queue rows behind the write/enrich split.

use serde::{Deserialize, Serialize};

use crate::ids::{EntryId, JobId};
use crate::{Timestamp, now};

/// Queue priority. Higher priorities are claimed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    Normal,
    High,
}

impl JobPriority {
    /// Numeric form used for ordering in the claim query.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Low),
            1 => Some(Self::Normal),
            2 => Some(Self::High),
            _ => None,
        }
    }
}

/// Lifecycle state of an enrichment job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed (or scheduled for a retry).
    Pending,
    /// Claimed by a worker.
    Running,
    /// All phases finished.
    Completed,
    /// Last attempt failed; will be retried at `next_run_at`.
    Failed,
    /// Exhausted its retries; surfaced for manual inspection.
    DeadLetter,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::DeadLetter => "dead_letter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "dead_letter" => Some(Self::DeadLetter),
            _ => None,
        }
    }
}

/// A durable enrichment job, one per created entry.
///
/// Per-phase flags keep retries incremental: a job that failed during
/// relation building does not re-link entities on the next attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentJob {
    pub id: JobId,
    pub entry_id: EntryId,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub attempts: u32,
    /// Earliest time the job may be (re)claimed.
    pub next_run_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_error: Option<String>,
    pub entities_done: bool,
    pub relations_done: bool,
    pub conflicts_done: bool,
    pub created_at: Timestamp,
}

impl EnrichmentJob {
    /// Create a pending job for a freshly written entry.
    pub fn new(entry_id: EntryId, priority: JobPriority) -> Self {
        let created_at = now();
        Self {
            id: JobId::new(),
            entry_id,
            priority,
            status: JobStatus::Pending,
            attempts: 0,
            next_run_at: created_at,
            last_error: None,
            entities_done: false,
            relations_done: false,
            conflicts_done: false,
            created_at,
        }
    }
}

/// Observable enrichment state of an entry, derived from its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// No phase has completed yet.
    Pending,
    /// Some phases completed, the job is still in flight or retrying.
    Partial,
    /// Every phase completed.
    Complete,
    /// The job dead-lettered before completing.
    Failed,
}

impl EnrichmentStatus {
    /// Derive the observable status from a job row.
    pub fn from_job(job: &EnrichmentJob) -> Self {
        let any_done = job.entities_done || job.relations_done || job.conflicts_done;
        match job.status {
            JobStatus::Completed => Self::Complete,
            JobStatus::DeadLetter => {
                if any_done {
                    Self::Partial
                } else {
                    Self::Failed
                }
            }
            _ => {
                if any_done {
                    Self::Partial
                } else {
                    Self::Pending
                }
            }
        }
    }
}
