//! Core traits for relq abstractions.
//!
//! [`QueueConnection`] is the contract every storage backend implements.
//! Callers only talk to this trait, so the PostgreSQL backend and the
//! in-memory backend are interchangeable.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::Result;
use crate::job::QueueJob;
use crate::models::*;
use crate::registry::JobRegistry;

// =============================================================================
// CONNECTION CONTRACT
// =============================================================================

/// A queue bound to one queue name and one storage backend.
///
/// Job state moves `pending/delayed -> reserved -> completed | failed`.
/// Every store failure surfaces as [`crate::Error::Store`] unless the method
/// documents otherwise.
#[async_trait]
pub trait QueueConnection: Send + Sync {
    /// Queue name all operations are scoped to.
    fn queue(&self) -> &str;

    /// Configuration captured at construction.
    fn config(&self) -> &QueueConfig;

    /// Job types known to this connection, used by `retry_failed_job`.
    fn registry(&self) -> &JobRegistry;

    /// Insert a job; returns its id.
    ///
    /// Unique jobs return the id of an outstanding duplicate instead of
    /// inserting. The check is best-effort: two concurrent pushes with the
    /// same key can both insert.
    async fn push(&self, job: NewJob) -> Result<Uuid>;

    /// Insert a job that becomes eligible at `execute_at`.
    async fn schedule(&self, job: NewJob, execute_at: DateTime<Utc>) -> Result<Uuid>;

    /// Reserve the next eligible job, highest priority first, FIFO within a
    /// priority. Increments `attempts`. Returns `None` when nothing is eligible.
    ///
    /// Two concurrent callers never receive the same job.
    async fn pop(&self) -> Result<Option<Job>>;

    /// Reserve up to `config().batch_size` jobs.
    async fn pop_batch(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::with_capacity(self.config().batch_size);
        while jobs.len() < self.config().batch_size {
            match self.pop().await? {
                Some(job) => jobs.push(job),
                None => break,
            }
        }
        Ok(jobs)
    }

    /// Mark a reserved job as completed. Returns false if no reserved job matched.
    async fn complete(&self, job_id: Uuid) -> Result<bool>;

    /// Put a reserved job back, eligible again after `delay`.
    async fn release(&self, job_id: Uuid, delay: Duration) -> Result<bool>;

    /// Hard-delete a job of this queue, whatever its state.
    async fn remove(&self, job_id: Uuid) -> Result<bool>;

    /// Fetch a job of this queue by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Create or update the recurring definition named `job.name`.
    ///
    /// `priority` falls back to the job's own priority, then the queue default.
    async fn register_recurring_job(
        &self,
        job: NewJob,
        cron: &str,
        priority: Option<i32>,
    ) -> Result<Uuid>;

    /// Recurring definitions of this queue, ordered by name.
    async fn recurring_jobs(&self) -> Result<Vec<RecurringJob>>;

    /// Delete a recurring definition by name.
    async fn remove_recurring_job(&self, name: &str) -> Result<bool>;

    /// Counts per state, computed now.
    async fn stats(&self) -> Result<QueueStats>;

    /// Delete completed and failed jobs older than `max_age`; returns the
    /// number of job rows removed.
    async fn prune(&self, max_age: Duration) -> Result<u64>;

    /// Run [`prune`](Self::prune) with the configured age when auto-prune is on.
    async fn prune_expired(&self) -> Result<u64> {
        if !self.config().auto_prune {
            return Ok(0);
        }
        self.prune(self.config().max_age).await
    }

    /// Delete every job of this queue; returns the number removed.
    async fn clear(&self) -> Result<u64>;

    /// Mark `job` failed and record why.
    ///
    /// Store errors are logged and reported as `false`; the caller decides
    /// whether to try again.
    async fn store_failed_job(&self, job: &Job, failure: &FailureInfo) -> bool;

    /// Failed-job records of this queue, newest first.
    async fn failed_jobs(&self, limit: i64, offset: i64) -> Result<Vec<FailedJob>>;

    /// Fetch a failed-job record by its own id.
    async fn get_failed_job(&self, id: Uuid) -> Result<Option<FailedJob>>;

    /// Delete a failed-job record.
    async fn forget_failed_job(&self, id: Uuid) -> Result<bool>;

    /// Delete every failed-job record of this queue.
    async fn flush_failed_jobs(&self) -> Result<u64>;

    /// Push a failed job again and drop its record.
    ///
    /// Returns false when the record is missing, its payload cannot be
    /// hydrated through the registry, or the store fails. The record is
    /// claimed by deleting it before anything is pushed, so of two concurrent
    /// retries of the same record only one returns true. The original failed
    /// row is deleted next so a unique job does not dedup against itself.
    ///
    /// Backends that can run the three steps in one transaction should
    /// override this; here a push failure after the claim loses the record.
    async fn retry_failed_job(&self, id: Uuid) -> bool {
        let failed = match self.get_failed_job(id).await {
            Ok(Some(failed)) => failed,
            Ok(None) => {
                debug!(
                    subsystem = "queue",
                    op = "retry_failed_job",
                    queue = %self.queue(),
                    failed_id = %id,
                    "Failed job record not found"
                );
                return false;
            }
            Err(e) => {
                warn!(
                    subsystem = "queue",
                    op = "retry_failed_job",
                    queue = %self.queue(),
                    failed_id = %id,
                    error = %e,
                    "Could not load failed job record"
                );
                return false;
            }
        };

        let job = match self.registry().hydrate(&failed.payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    subsystem = "queue",
                    op = "retry_failed_job",
                    queue = %self.queue(),
                    failed_id = %id,
                    job_id = %failed.job_id,
                    error = %e,
                    "Failed job payload could not be hydrated"
                );
                return false;
            }
        };

        match self.forget_failed_job(failed.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    subsystem = "queue",
                    op = "retry_failed_job",
                    queue = %self.queue(),
                    failed_id = %id,
                    "Failed job record already claimed by another retry"
                );
                return false;
            }
            Err(e) => {
                warn!(
                    subsystem = "queue",
                    op = "retry_failed_job",
                    queue = %self.queue(),
                    failed_id = %id,
                    error = %e,
                    "Could not claim failed job record"
                );
                return false;
            }
        }

        let requeued = async {
            self.remove(failed.job_id).await?;
            self.push(job).await
        }
        .await;

        match requeued {
            Ok(new_id) => {
                info!(
                    subsystem = "queue",
                    op = "retry_failed_job",
                    queue = %self.queue(),
                    failed_id = %id,
                    job_id = %new_id,
                    "Failed job pushed again"
                );
                true
            }
            Err(e) => {
                error!(
                    subsystem = "queue",
                    op = "retry_failed_job",
                    queue = %self.queue(),
                    failed_id = %id,
                    job_id = %failed.job_id,
                    payload = %failed.payload,
                    error = %e,
                    "Failed job record was claimed but the job could not be pushed again"
                );
                false
            }
        }
    }

    /// Release the backend's resources. Later calls fail with
    /// [`crate::Error::Closed`].
    async fn close(&self);
}

// =============================================================================
// TYPED HELPERS
// =============================================================================

/// Typed conveniences over [`QueueConnection`].
#[async_trait]
pub trait QueueConnectionExt: QueueConnection {
    /// Serialize and push a typed job.
    async fn push_job<J: QueueJob>(&self, job: &J) -> Result<Uuid> {
        self.push(NewJob::from_job(job)?).await
    }

    /// Serialize and schedule a typed job.
    async fn schedule_job<J: QueueJob>(&self, job: &J, execute_at: DateTime<Utc>) -> Result<Uuid> {
        self.schedule(NewJob::from_job(job)?, execute_at).await
    }

    /// Register a typed job as recurring under `J::NAME`.
    async fn register_recurring<J: QueueJob>(
        &self,
        job: &J,
        cron: &str,
        priority: Option<i32>,
    ) -> Result<Uuid> {
        self.register_recurring_job(NewJob::from_job(job)?, cron, priority)
            .await
    }

    /// Put a reserved job back using the configured retry strategy, or report
    /// false once `max_retries` is exhausted.
    async fn retry_later(&self, job: &Job) -> Result<bool> {
        if !self.config().should_retry(job.attempts) {
            return Ok(false);
        }
        let delay = self.config().retry_delay_for(job.attempts);
        self.release(job.id, delay).await
    }
}

impl<T: QueueConnection + ?Sized> QueueConnectionExt for T {}
