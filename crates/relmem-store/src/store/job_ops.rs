//! Durable enrichment queue operations.
//!
//! Jobs live in the same SQLite file as the entries they enrich, so a
//! crashed process picks its queue back up on restart. Claiming uses a
//! single `UPDATE .. RETURNING` statement, which is atomic under the
//! connection mutex.

use std::time::Duration;

use chrono::{DateTime, Utc};
use relmem_types::{EnrichmentJob, EntryId, JobId, JobPriority, JobStatus, now};
use rusqlite::{Connection, params};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

use super::MemoryStore;
use super::entry_ops::parse_timestamp;

/// Insert a job row. Transaction-composable.
pub(crate) fn insert_job_tx(conn: &Connection, job: &EnrichmentJob) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO jobs (id, entry_id, priority, status, attempts, next_run_at, last_error,
                          entities_done, relations_done, conflicts_done, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            job.id.to_string(),
            job.entry_id.to_string(),
            job.priority.as_i64(),
            job.status.as_str(),
            job.attempts,
            job.next_run_at.to_rfc3339(),
            job.last_error,
            job.entities_done as i32,
            job.relations_done as i32,
            job.conflicts_done as i32,
            job.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl MemoryStore {
    /// Enqueue a job outside an entry commit. Requeues use this.
    pub fn enqueue_job(&self, job: &EnrichmentJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_job_tx(&conn, job)
    }

    /// Get a job by id.
    pub fn get_job(&self, id: JobId) -> Result<Option<EnrichmentJob>> {
        let conn = self.conn.lock().unwrap();
        get_job_tx(&conn, id)
    }

    /// The most recent job for an entry.
    pub fn job_for_entry(&self, entry_id: EntryId) -> Result<Option<EnrichmentJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{JOB_COLUMNS_SQL} WHERE entry_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![entry_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_job(row)?))
        } else {
            Ok(None)
        }
    }

    /// Atomically claim the next runnable job, if any.
    ///
    /// Runnable means pending or failed with `next_run_at` in the past.
    /// Highest priority first, then oldest. The claim bumps the attempt
    /// counter and flips the job to running in one statement.
    pub fn claim_next_job(&self) -> Result<Option<EnrichmentJob>> {
        let conn = self.conn.lock().unwrap();
        let now_str = now().to_rfc3339();

        let mut stmt = conn.prepare(
            r#"
            UPDATE jobs SET status = 'running', attempts = attempts + 1
            WHERE id = (
                SELECT id FROM jobs
                WHERE status IN ('pending', 'failed') AND next_run_at <= ?1
                ORDER BY priority DESC, created_at ASC, id ASC
                LIMIT 1
            )
            RETURNING id, entry_id, priority, status, attempts, next_run_at, last_error,
                      entities_done, relations_done, conflicts_done, created_at
            "#,
        )?;

        let mut rows = stmt.query(params![now_str])?;
        if let Some(row) = rows.next()? {
            let job = row_to_job(row)?;
            debug!("Claimed job {} for entry {}", job.id, job.entry_id);
            Ok(Some(job))
        } else {
            Ok(None)
        }
    }

    /// Persist per-phase completion flags for a running job.
    pub fn update_job_progress(&self, job: &EnrichmentJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE jobs SET entities_done = ?2, relations_done = ?3, conflicts_done = ?4
             WHERE id = ?1",
            params![
                job.id.to_string(),
                job.entities_done as i32,
                job.relations_done as i32,
                job.conflicts_done as i32,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Job {}", job.id)));
        }
        Ok(())
    }

    /// Mark a job completed.
    pub fn complete_job(&self, id: JobId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE jobs SET status = 'completed', last_error = NULL,
                    entities_done = 1, relations_done = 1, conflicts_done = 1
             WHERE id = ?1",
            params![id.to_string()],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Job {}", id)));
        }
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Schedules a retry with exponential backoff, or dead-letters the job
    /// once `max_attempts` is exhausted. Returns the resulting status.
    pub fn fail_job(
        &self,
        id: JobId,
        error: &str,
        base_backoff: Duration,
        max_attempts: u32,
    ) -> Result<JobStatus> {
        let conn = self.conn.lock().unwrap();
        let job = get_job_tx(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("Job {}", id)))?;

        if job.attempts >= max_attempts {
            conn.execute(
                "UPDATE jobs SET status = 'dead_letter', last_error = ?2 WHERE id = ?1",
                params![id.to_string(), error],
            )?;
            warn!(
                "Job {} dead-lettered after {} attempts: {}",
                id, job.attempts, error
            );
            return Ok(JobStatus::DeadLetter);
        }

        // attempts was already bumped at claim time
        let exponent = job.attempts.saturating_sub(1).min(16);
        let delay = base_backoff * 2u32.pow(exponent);
        let next_run_at: DateTime<Utc> = now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));

        conn.execute(
            "UPDATE jobs SET status = 'failed', last_error = ?2, next_run_at = ?3 WHERE id = ?1",
            params![id.to_string(), error, next_run_at.to_rfc3339()],
        )?;
        debug!("Job {} failed (attempt {}), retrying in {:?}", id, job.attempts, delay);
        Ok(JobStatus::Failed)
    }

    /// Dead-lettered jobs, oldest first.
    pub fn dead_letter_jobs(&self, limit: usize) -> Result<Vec<EnrichmentJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{JOB_COLUMNS_SQL} WHERE status = 'dead_letter'
             ORDER BY created_at ASC LIMIT ?1"
        ))?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next()? {
            jobs.push(row_to_job(row)?);
        }
        Ok(jobs)
    }

    /// Put a dead-lettered job back in the queue with a fresh attempt budget.
    pub fn retry_job(&self, id: JobId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let job = get_job_tx(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("Job {}", id)))?;

        if job.status != JobStatus::DeadLetter {
            return Err(StoreError::InvalidState(format!(
                "job {} is {}, only dead-lettered jobs can be requeued",
                id,
                job.status.as_str()
            )));
        }

        conn.execute(
            "UPDATE jobs SET status = 'pending', attempts = 0, last_error = NULL,
                    next_run_at = ?2
             WHERE id = ?1",
            params![id.to_string(), now().to_rfc3339()],
        )?;
        Ok(())
    }
}

const JOB_COLUMNS_SQL: &str = r#"
    SELECT id, entry_id, priority, status, attempts, next_run_at, last_error,
           entities_done, relations_done, conflicts_done, created_at
    FROM jobs
"#;

fn get_job_tx(conn: &Connection, id: JobId) -> Result<Option<EnrichmentJob>> {
    let mut stmt = conn.prepare(&format!("{JOB_COLUMNS_SQL} WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id.to_string()])?;
    if let Some(row) = rows.next()? {
        Ok(Some(row_to_job(row)?))
    } else {
        Ok(None)
    }
}

fn row_to_job(row: &rusqlite::Row) -> Result<EnrichmentJob> {
    let id_str: String = row.get(0)?;
    let entry_str: String = row.get(1)?;
    let priority_int: i64 = row.get(2)?;
    let status_str: String = row.get(3)?;
    let attempts: u32 = row.get(4)?;
    let next_run_at_str: String = row.get(5)?;
    let last_error: Option<String> = row.get(6)?;
    let entities_done: i32 = row.get(7)?;
    let relations_done: i32 = row.get(8)?;
    let conflicts_done: i32 = row.get(9)?;
    let created_at_str: String = row.get(10)?;

    let priority = JobPriority::from_i64(priority_int)
        .ok_or_else(|| StoreError::InvalidData(format!("Unknown job priority: {}", priority_int)))?;
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| StoreError::InvalidData(format!("Unknown job status: {}", status_str)))?;

    Ok(EnrichmentJob {
        id: JobId::parse(&id_str)?,
        entry_id: EntryId::parse(&entry_str)?,
        priority,
        status,
        attempts,
        next_run_at: parse_timestamp(&next_run_at_str)?,
        last_error,
        entities_done: entities_done != 0,
        relations_done: relations_done != 0,
        conflicts_done: conflicts_done != 0,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_types::{ContentType, MemoryEntry, Scope};

    fn create_test_store() -> MemoryStore {
        MemoryStore::open_in_memory(4).unwrap()
    }

    fn committed_with_job(store: &MemoryStore, priority: JobPriority) -> EnrichmentJob {
        let e = MemoryEntry::new(ContentType::Fact, "x", 0.9, Scope::new("acme"));
        let job = EnrichmentJob::new(e.id, priority);
        store
            .commit_entry(&e, &[1.0, 0.0, 0.0, 0.0], Some(&job))
            .unwrap();
        job
    }

    #[test]
    fn test_claim_orders_by_priority_then_age() {
        let store = create_test_store();
        let low = committed_with_job(&store, JobPriority::Low);
        let normal = committed_with_job(&store, JobPriority::Normal);
        let high = committed_with_job(&store, JobPriority::High);

        let first = store.claim_next_job().unwrap().unwrap();
        assert_eq!(first.id, high.id);
        assert_eq!(first.status, JobStatus::Running);
        assert_eq!(first.attempts, 1);

        assert_eq!(store.claim_next_job().unwrap().unwrap().id, normal.id);
        assert_eq!(store.claim_next_job().unwrap().unwrap().id, low.id);
        assert!(store.claim_next_job().unwrap().is_none());
    }

    #[test]
    fn test_fail_schedules_retry_then_dead_letters() {
        let store = create_test_store();
        let job = committed_with_job(&store, JobPriority::Normal);

        let claimed = store.claim_next_job().unwrap().unwrap();
        let status = store
            .fail_job(claimed.id, "embedder down", Duration::from_secs(30), 3)
            .unwrap();
        assert_eq!(status, JobStatus::Failed);

        // Backed off into the future, so not immediately claimable
        assert!(store.claim_next_job().unwrap().is_none());

        let stored = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("embedder down"));
        assert!(stored.next_run_at > now());

        // Attempts exhausted: dead letter
        let status = store
            .fail_job(job.id, "still down", Duration::from_secs(30), 1)
            .unwrap();
        assert_eq!(status, JobStatus::DeadLetter);

        let dead = store.dead_letter_jobs(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, job.id);
    }

    #[test]
    fn test_progress_and_complete() {
        let store = create_test_store();
        let job = committed_with_job(&store, JobPriority::Normal);

        let mut claimed = store.claim_next_job().unwrap().unwrap();
        claimed.entities_done = true;
        store.update_job_progress(&claimed).unwrap();

        let stored = store.get_job(job.id).unwrap().unwrap();
        assert!(stored.entities_done);
        assert!(!stored.relations_done);

        store.complete_job(job.id).unwrap();
        let done = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.relations_done && done.conflicts_done);

        // Completed jobs are not claimable
        assert!(store.claim_next_job().unwrap().is_none());
    }

    #[test]
    fn test_retry_requeues_dead_letter_only() {
        let store = create_test_store();
        let job = committed_with_job(&store, JobPriority::Normal);

        // Not dead-lettered yet
        assert!(store.retry_job(job.id).is_err());

        store.claim_next_job().unwrap().unwrap();
        store
            .fail_job(job.id, "boom", Duration::from_secs(30), 1)
            .unwrap();

        store.retry_job(job.id).unwrap();
        let requeued = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert_eq!(requeued.attempts, 0);
        assert!(requeued.last_error.is_none());

        assert!(store.claim_next_job().unwrap().is_some());
    }

    #[test]
    fn test_job_for_entry() {
        let store = create_test_store();
        let e = MemoryEntry::new(ContentType::Fact, "x", 0.9, Scope::new("acme"));
        let job = EnrichmentJob::new(e.id, JobPriority::Normal);
        store
            .commit_entry(&e, &[1.0, 0.0, 0.0, 0.0], Some(&job))
            .unwrap();

        let found = store.job_for_entry(e.id).unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert!(store.job_for_entry(EntryId::new()).unwrap().is_none());
    }
}
