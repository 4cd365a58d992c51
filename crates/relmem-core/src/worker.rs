//! Enrichment worker pool.
//!
//! Workers poll the durable job queue and run the three enrichment phases
//! in order: entity extraction, relation inference, conflict detection.
//! Progress is checkpointed after each phase, so a retried job resumes at
//! the phase that failed instead of redoing completed work. Every phase
//! writes through idempotent store operations, making redone work harmless
//! anyway.

use std::sync::Arc;

use relmem_infer::SharedInference;
use relmem_store::MemoryStore;
use relmem_types::{EnrichmentJob, JobStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{QueueConfig, RmcConfig};
use crate::conflicts::ConflictDetector;
use crate::error::Result;
use crate::extract::EntityExtractor;
use crate::relations::RelationBuilder;

/// Runs all enrichment phases for one claimed job.
pub struct EnrichmentPipeline {
    store: Arc<MemoryStore>,
    extractor: EntityExtractor,
    relations: RelationBuilder,
    conflicts: ConflictDetector,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<MemoryStore>,
        inference: Option<SharedInference>,
        config: &RmcConfig,
    ) -> Self {
        let extractor = match &inference {
            Some(inference) => {
                EntityExtractor::with_inference(&config.extraction, Arc::clone(inference))
            }
            None => EntityExtractor::rule_based(&config.extraction),
        };
        Self {
            extractor,
            relations: RelationBuilder::new(Arc::clone(&store), inference, config),
            conflicts: ConflictDetector::new(Arc::clone(&store)),
            store,
        }
    }

    /// Run the remaining phases of a job, checkpointing after each.
    pub async fn run(&self, job: &mut EnrichmentJob) -> Result<()> {
        let Some(entry) = self.store.get_entry(job.entry_id)? else {
            // The entry is gone; nothing left to enrich
            debug!(entry_id = %job.entry_id, "Entry missing, completing job as a no-op");
            return Ok(());
        };

        if !job.entities_done {
            let mentions = self.extractor.extract(&entry.content).await;
            for mention in &mentions {
                self.store.record_mention(entry.id, mention)?;
            }
            debug!(entry_id = %entry.id, count = mentions.len(), "Entity phase done");
            job.entities_done = true;
            self.store.update_job_progress(job)?;
        }

        if !job.relations_done {
            let created = self.relations.build_relations(entry.id).await?;
            debug!(entry_id = %entry.id, created, "Relation phase done");
            job.relations_done = true;
            self.store.update_job_progress(job)?;
        }

        if !job.conflicts_done {
            let found = self.conflicts.detect_structural(entry.id)?;
            debug!(entry_id = %entry.id, found, "Conflict phase done");
            job.conflicts_done = true;
        }

        Ok(())
    }
}

/// A pool of polling workers over the shared job queue.
pub struct EnrichmentWorkerPool {
    pipeline: Arc<EnrichmentPipeline>,
    config: QueueConfig,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl EnrichmentWorkerPool {
    pub fn new(store: Arc<MemoryStore>, inference: Option<SharedInference>, config: &RmcConfig) -> Self {
        Self {
            pipeline: Arc::new(EnrichmentPipeline::new(store, inference, config)),
            config: config.queue.clone(),
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn the configured number of workers.
    pub fn start(&mut self) {
        for worker_id in 0..self.config.workers {
            let pipeline = Arc::clone(&self.pipeline);
            let config = self.config.clone();
            let shutdown = self.shutdown.clone();
            self.handles.push(tokio::spawn(async move {
                worker_loop(worker_id, pipeline, config, shutdown).await;
            }));
        }
        info!(workers = self.config.workers, "Enrichment worker pool started");
    }

    /// Signal shutdown and wait for in-flight jobs to finish.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Enrichment worker panicked: {e}");
            }
        }
        info!("Enrichment worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    pipeline: Arc<EnrichmentPipeline>,
    config: QueueConfig,
    shutdown: CancellationToken,
) {
    debug!(worker_id, "Enrichment worker started");
    loop {
        let claimed = match pipeline.store.claim_next_job() {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(worker_id, "Job claim failed: {e}");
                None
            }
        };

        match claimed {
            Some(mut job) => {
                process_job(&pipeline, &config, &mut job).await;
                // Drain the queue before sleeping again
                if shutdown.is_cancelled() {
                    break;
                }
            }
            None => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(config.poll_interval()) => {}
                }
            }
        }
    }
    debug!(worker_id, "Enrichment worker stopped");
}

async fn process_job(pipeline: &EnrichmentPipeline, config: &QueueConfig, job: &mut EnrichmentJob) {
    match pipeline.run(job).await {
        Ok(()) => {
            if let Err(e) = pipeline.store.complete_job(job.id) {
                error!(job_id = %job.id, "Failed to mark job complete: {e}");
            }
        }
        Err(e) => {
            warn!(job_id = %job.id, entry_id = %job.entry_id, "Enrichment failed: {e}");
            match pipeline.store.fail_job(
                job.id,
                &e.to_string(),
                config.base_backoff(),
                config.max_attempts,
            ) {
                Ok(JobStatus::DeadLetter) => {
                    error!(job_id = %job.id, "Job dead-lettered");
                }
                Ok(_) => {}
                Err(e) => error!(job_id = %job.id, "Failed to record job failure: {e}"),
            }
        }
    }
}
