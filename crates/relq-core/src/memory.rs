//! In-memory queue backend for tests and single-process use.
//!
//! A [`MemoryStore`] plays the role of the shared datastore: several
//! [`MemoryConnection`]s (one per queue) can hand jobs to each other through
//! it. A single async mutex stands in for row locking, so `pop` is exclusive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::models::*;
use crate::registry::JobRegistry;
use crate::schedule::normalize_cron;
use crate::traits::QueueConnection;
use crate::uuid_utils::new_v7;

/// Source of "now" for a connection.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredJob {
    job: Job,
    /// Insertion order, final FIFO tie-break.
    seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<Uuid, StoredJob>,
    failed: HashMap<Uuid, FailedJob>,
    recurring: HashMap<(String, String), RecurringJob>,
    next_seq: u64,
}

/// Shared in-memory datastore.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection for `queue` backed by this store.
    pub fn connection(
        &self,
        queue: impl Into<String>,
        config: Arc<QueueConfig>,
        registry: Arc<JobRegistry>,
    ) -> MemoryConnection {
        MemoryConnection {
            queue: queue.into(),
            config,
            registry,
            store: self.clone(),
            clock: Arc::new(Utc::now),
            closed: AtomicBool::new(false),
        }
    }
}

/// [`QueueConnection`] over a [`MemoryStore`].
pub struct MemoryConnection {
    queue: String,
    config: Arc<QueueConfig>,
    registry: Arc<JobRegistry>,
    store: MemoryStore,
    clock: Clock,
    closed: AtomicBool,
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("queue", &self.queue)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryConnection {
    /// Replace the clock, e.g. with a manually advanced one in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed(format!("queue '{}'", self.queue)));
        }
        Ok(())
    }

    fn insert(
        &self,
        tables: &mut Tables,
        job: NewJob,
        execute_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Uuid {
        if self.config.support_unique_jobs {
            if let Some(key) = job.unique_key.as_deref() {
                let existing = tables.jobs.values().find(|stored| {
                    stored.job.queue == self.queue
                        && stored.job.unique_key.as_deref() == Some(key)
                        && stored
                            .job
                            .blocks_unique_push(now, self.config.unique_jobs_expiration)
                });
                if let Some(existing) = existing {
                    debug!(
                        subsystem = "queue",
                        component = "memory_connection",
                        op = "push",
                        queue = %self.queue,
                        unique_key = %key,
                        job_id = %existing.job.id,
                        "Unique job already queued"
                    );
                    return existing.job.id;
                }
            }
        }

        let id = new_v7();
        let seq = tables.next_seq;
        tables.next_seq += 1;
        let row = Job {
            id,
            queue: self.queue.clone(),
            payload: job.payload,
            priority: job.priority.unwrap_or(self.config.default_priority),
            unique_key: job.unique_key.filter(|_| self.config.support_unique_jobs),
            attempts: 0,
            created_at: now,
            execute_at,
            reserved_at: None,
            failed_at: None,
            last_executed_at: None,
        };
        tables.jobs.insert(id, StoredJob { job: row, seq });
        debug!(
            subsystem = "queue",
            component = "memory_connection",
            op = "push",
            queue = %self.queue,
            job_id = %id,
            job_name = %job.name,
            "Job queued"
        );
        id
    }

    fn own_job<'a>(&self, tables: &'a mut Tables, job_id: Uuid) -> Option<&'a mut Job> {
        tables
            .jobs
            .get_mut(&job_id)
            .map(|stored| &mut stored.job)
            .filter(|job| job.queue == self.queue)
    }
}

#[async_trait]
impl QueueConnection for MemoryConnection {
    fn queue(&self) -> &str {
        &self.queue
    }

    fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    async fn push(&self, job: NewJob) -> Result<Uuid> {
        self.ensure_open()?;
        let now = self.now();
        let delay = job.delay.unwrap_or(self.config.default_delay);
        let execute_at = (!delay.is_zero()).then(|| add_duration(now, delay));
        let mut tables = self.store.tables.lock().await;
        Ok(self.insert(&mut tables, job, execute_at, now))
    }

    async fn schedule(&self, job: NewJob, execute_at: DateTime<Utc>) -> Result<Uuid> {
        self.ensure_open()?;
        let now = self.now();
        let mut tables = self.store.tables.lock().await;
        Ok(self.insert(&mut tables, job, Some(execute_at), now))
    }

    async fn pop(&self) -> Result<Option<Job>> {
        self.ensure_open()?;
        let now = self.now();
        let mut tables = self.store.tables.lock().await;

        let winner = tables
            .jobs
            .values()
            .filter(|stored| stored.job.queue == self.queue && stored.job.is_eligible_at(now))
            .min_by_key(|stored| {
                (
                    std::cmp::Reverse(stored.job.priority),
                    stored.job.created_at,
                    stored.seq,
                )
            })
            .map(|stored| stored.job.id);

        let Some(id) = winner else {
            return Ok(None);
        };
        let Some(stored) = tables.jobs.get_mut(&id) else {
            return Ok(None);
        };
        stored.job.reserved_at = Some(now);
        stored.job.attempts += 1;
        debug!(
            subsystem = "queue",
            component = "memory_connection",
            op = "pop",
            queue = %self.queue,
            job_id = %id,
            attempts = stored.job.attempts,
            "Job reserved"
        );
        Ok(Some(stored.job.clone()))
    }

    async fn complete(&self, job_id: Uuid) -> Result<bool> {
        self.ensure_open()?;
        let now = self.now();
        let mut tables = self.store.tables.lock().await;
        match self.own_job(&mut tables, job_id) {
            Some(job) if job.state_at(now) == JobState::Reserved => {
                job.reserved_at = None;
                job.last_executed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, job_id: Uuid, delay: Duration) -> Result<bool> {
        self.ensure_open()?;
        let now = self.now();
        let mut tables = self.store.tables.lock().await;
        match self.own_job(&mut tables, job_id) {
            Some(job) if job.state_at(now) == JobState::Reserved => {
                job.reserved_at = None;
                job.execute_at = Some(add_duration(now, delay));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, job_id: Uuid) -> Result<bool> {
        self.ensure_open()?;
        let mut tables = self.store.tables.lock().await;
        if self.own_job(&mut tables, job_id).is_none() {
            return Ok(false);
        }
        Ok(tables.jobs.remove(&job_id).is_some())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        self.ensure_open()?;
        let mut tables = self.store.tables.lock().await;
        Ok(self.own_job(&mut tables, job_id).map(|job| job.clone()))
    }

    async fn register_recurring_job(
        &self,
        job: NewJob,
        cron: &str,
        priority: Option<i32>,
    ) -> Result<Uuid> {
        self.ensure_open()?;
        let cron = normalize_cron(cron)?;
        let now = self.now();
        let priority = priority
            .or(job.priority)
            .unwrap_or(self.config.default_priority);
        let mut tables = self.store.tables.lock().await;

        let key = (self.queue.clone(), job.name.clone());
        let entry = tables
            .recurring
            .entry(key)
            .and_modify(|existing| {
                existing.cron = cron.clone();
                existing.payload = job.payload.clone();
                existing.priority = priority;
                existing.updated_at = now;
            })
            .or_insert_with(|| RecurringJob {
                id: new_v7(),
                queue: self.queue.clone(),
                name: job.name.clone(),
                cron: cron.clone(),
                payload: job.payload.clone(),
                priority,
                created_at: now,
                updated_at: now,
            });
        Ok(entry.id)
    }

    async fn recurring_jobs(&self) -> Result<Vec<RecurringJob>> {
        self.ensure_open()?;
        let tables = self.store.tables.lock().await;
        let mut jobs: Vec<_> = tables
            .recurring
            .values()
            .filter(|job| job.queue == self.queue)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }

    async fn remove_recurring_job(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        let mut tables = self.store.tables.lock().await;
        Ok(tables
            .recurring
            .remove(&(self.queue.clone(), name.to_string()))
            .is_some())
    }

    async fn stats(&self) -> Result<QueueStats> {
        self.ensure_open()?;
        let now = self.now();
        let tables = self.store.tables.lock().await;
        let mut stats = QueueStats::default();
        for stored in tables.jobs.values().filter(|s| s.job.queue == self.queue) {
            match stored.job.state_at(now) {
                JobState::Pending => stats.pending += 1,
                JobState::Delayed => stats.delayed += 1,
                JobState::Reserved => stats.reserved += 1,
                JobState::Completed => stats.done += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        stats.recurring = tables
            .recurring
            .values()
            .filter(|job| job.queue == self.queue)
            .count() as i64;
        Ok(stats)
    }

    async fn prune(&self, max_age: Duration) -> Result<u64> {
        self.ensure_open()?;
        let cutoff = sub_duration(self.now(), max_age);
        let mut tables = self.store.tables.lock().await;

        let before = tables.jobs.len();
        tables.jobs.retain(|_, stored| {
            let job = &stored.job;
            if job.queue != self.queue {
                return true;
            }
            let expired = match (job.failed_at, job.last_executed_at) {
                (Some(failed_at), _) => failed_at < cutoff,
                (None, Some(done_at)) => done_at < cutoff,
                (None, None) => false,
            };
            !expired
        });
        let removed = (before - tables.jobs.len()) as u64;
        tables
            .failed
            .retain(|_, failed| failed.queue != self.queue || failed.failed_at >= cutoff);

        info!(
            subsystem = "queue",
            component = "memory_connection",
            op = "prune",
            queue = %self.queue,
            rows_affected = removed,
            "Pruned old jobs"
        );
        Ok(removed)
    }

    async fn clear(&self) -> Result<u64> {
        self.ensure_open()?;
        let mut tables = self.store.tables.lock().await;
        let before = tables.jobs.len();
        tables.jobs.retain(|_, stored| stored.job.queue != self.queue);
        Ok((before - tables.jobs.len()) as u64)
    }

    async fn store_failed_job(&self, job: &Job, failure: &FailureInfo) -> bool {
        if let Err(e) = self.ensure_open() {
            warn!(
                subsystem = "queue",
                component = "memory_connection",
                op = "store_failed_job",
                queue = %self.queue,
                job_id = %job.id,
                error = %e,
                "Could not store failed job"
            );
            return false;
        }
        let now = self.now();
        let mut tables = self.store.tables.lock().await;
        if let Some(row) = self.own_job(&mut tables, job.id) {
            row.failed_at = Some(now);
        }
        if !self.config.store_failed_jobs {
            return true;
        }

        let existing = tables
            .failed
            .values_mut()
            .find(|failed| failed.queue == self.queue && failed.job_id == job.id);
        match existing {
            Some(record) => {
                record.payload = job.payload.clone();
                record.exception = failure.clone();
                record.failed_at = now;
            }
            None => {
                let id = new_v7();
                tables.failed.insert(
                    id,
                    FailedJob {
                        id,
                        queue: self.queue.clone(),
                        job_id: job.id,
                        payload: job.payload.clone(),
                        exception: failure.clone(),
                        failed_at: now,
                    },
                );
            }
        }
        true
    }

    async fn failed_jobs(&self, limit: i64, offset: i64) -> Result<Vec<FailedJob>> {
        self.ensure_open()?;
        let tables = self.store.tables.lock().await;
        let mut records: Vec<_> = tables
            .failed
            .values()
            .filter(|failed| failed.queue == self.queue)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.failed_at.cmp(&a.failed_at).then(b.id.cmp(&a.id)));
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_failed_job(&self, id: Uuid) -> Result<Option<FailedJob>> {
        self.ensure_open()?;
        let tables = self.store.tables.lock().await;
        Ok(tables
            .failed
            .get(&id)
            .filter(|failed| failed.queue == self.queue)
            .cloned())
    }

    async fn forget_failed_job(&self, id: Uuid) -> Result<bool> {
        self.ensure_open()?;
        let mut tables = self.store.tables.lock().await;
        let owned = tables
            .failed
            .get(&id)
            .is_some_and(|failed| failed.queue == self.queue);
        Ok(owned && tables.failed.remove(&id).is_some())
    }

    async fn flush_failed_jobs(&self) -> Result<u64> {
        self.ensure_open()?;
        let mut tables = self.store.tables.lock().await;
        let before = tables.failed.len();
        tables.failed.retain(|_, failed| failed.queue != self.queue);
        Ok((before - tables.failed.len()) as u64)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        info!(
            subsystem = "queue",
            component = "memory_connection",
            op = "close",
            queue = %self.queue,
            "Connection closed"
        );
    }
}
