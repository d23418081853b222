//! PostgreSQL implementation of [`QueueConnection`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use relq_core::{
    add_duration, new_v7, sub_duration, Error, FailedJob, FailureInfo, Job, JobRegistry, NewJob,
    QueueConfig, QueueConnection, QueueStats, RecurringJob, Result,
};

use crate::pool::{log_pool_metrics, PoolConfig};
use crate::tables::QueueTables;

const JOB_COLUMNS: &str = "id, queue, payload, priority, unique_key, attempts, created_at, \
                           execute_at, reserved_at, failed_at, last_executed_at";

const FAILED_COLUMNS: &str = "id, queue, job_id, payload, exception, failed_at";

const RECURRING_COLUMNS: &str =
    "id, queue, name, cron, payload, priority, created_at, updated_at";

/// Untouched by any worker: not reserved, completed or failed.
const UNCLAIMED: &str = "reserved_at IS NULL AND failed_at IS NULL AND last_executed_at IS NULL";

/// Held by a worker.
const RESERVED: &str =
    "reserved_at IS NOT NULL AND failed_at IS NULL AND last_executed_at IS NULL";

/// SQL for one set of table names, rendered once per connection.
#[derive(Debug, Clone)]
struct Statements {
    insert_job: String,
    find_duplicate: String,
    select_next: String,
    reserve: String,
    complete: String,
    release: String,
    remove: String,
    get: String,
    upsert_recurring: String,
    list_recurring: String,
    remove_recurring: String,
    stats: String,
    prune_jobs: String,
    prune_failed: String,
    clear: String,
    mark_failed: String,
    upsert_failed: String,
    list_failed: String,
    get_failed: String,
    forget_failed: String,
    claim_failed: String,
    flush_failed: String,
}

impl Statements {
    fn render(tables: &QueueTables) -> Self {
        let QueueTables {
            jobs,
            failed,
            recurring,
        } = tables;

        Self {
            insert_job: format!(
                "INSERT INTO {jobs} (id, queue, payload, priority, unique_key, attempts, created_at, execute_at)
                 VALUES ($1, $2, $3, $4, $5, 0, $6, $7)"
            ),
            // Completed rows never block; failed rows block only inside the window ($3).
            find_duplicate: format!(
                "SELECT id FROM {jobs}
                 WHERE queue = $1 AND unique_key = $2
                   AND NOT (last_executed_at IS NOT NULL AND failed_at IS NULL)
                   AND (failed_at IS NULL OR failed_at > $3)
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1"
            ),
            select_next: format!(
                "SELECT id FROM {jobs}
                 WHERE queue = $1 AND {UNCLAIMED}
                   AND (execute_at IS NULL OR execute_at <= $2)
                 ORDER BY priority DESC, created_at ASC, id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED"
            ),
            reserve: format!(
                "UPDATE {jobs} SET reserved_at = $1, attempts = attempts + 1
                 WHERE id = $2
                 RETURNING {JOB_COLUMNS}"
            ),
            complete: format!(
                "UPDATE {jobs} SET last_executed_at = $1, reserved_at = NULL
                 WHERE id = $2 AND queue = $3 AND {RESERVED}"
            ),
            release: format!(
                "UPDATE {jobs} SET reserved_at = NULL, execute_at = $1
                 WHERE id = $2 AND queue = $3 AND {RESERVED}"
            ),
            remove: format!("DELETE FROM {jobs} WHERE id = $1 AND queue = $2"),
            get: format!("SELECT {JOB_COLUMNS} FROM {jobs} WHERE id = $1 AND queue = $2"),
            upsert_recurring: format!(
                "INSERT INTO {recurring} (id, queue, name, cron, payload, priority, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                 ON CONFLICT (queue, name) DO UPDATE
                 SET cron = EXCLUDED.cron,
                     payload = EXCLUDED.payload,
                     priority = EXCLUDED.priority,
                     updated_at = EXCLUDED.updated_at
                 RETURNING id"
            ),
            list_recurring: format!(
                "SELECT {RECURRING_COLUMNS} FROM {recurring} WHERE queue = $1 ORDER BY name"
            ),
            remove_recurring: format!("DELETE FROM {recurring} WHERE queue = $1 AND name = $2"),
            stats: format!(
                "SELECT
                    COUNT(*) FILTER (WHERE {UNCLAIMED} AND (execute_at IS NULL OR execute_at <= $2)) AS pending,
                    COUNT(*) FILTER (WHERE {UNCLAIMED} AND execute_at > $2) AS delayed,
                    COUNT(*) FILTER (WHERE {RESERVED}) AS reserved,
                    COUNT(*) FILTER (WHERE failed_at IS NULL AND last_executed_at IS NOT NULL) AS done,
                    COUNT(*) FILTER (WHERE failed_at IS NOT NULL) AS failed,
                    (SELECT COUNT(*) FROM {recurring} WHERE queue = $1) AS recurring
                 FROM {jobs}
                 WHERE queue = $1"
            ),
            prune_jobs: format!(
                "DELETE FROM {jobs}
                 WHERE queue = $1
                   AND ((failed_at IS NOT NULL AND failed_at < $2)
                     OR (failed_at IS NULL AND last_executed_at IS NOT NULL AND last_executed_at < $2))"
            ),
            prune_failed: format!("DELETE FROM {failed} WHERE queue = $1 AND failed_at < $2"),
            clear: format!("DELETE FROM {jobs} WHERE queue = $1"),
            mark_failed: format!(
                "UPDATE {jobs} SET failed_at = $1 WHERE id = $2 AND queue = $3"
            ),
            upsert_failed: format!(
                "INSERT INTO {failed} (id, queue, job_id, payload, exception, failed_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (queue, job_id) DO UPDATE
                 SET payload = EXCLUDED.payload,
                     exception = EXCLUDED.exception,
                     failed_at = EXCLUDED.failed_at"
            ),
            list_failed: format!(
                "SELECT {FAILED_COLUMNS} FROM {failed}
                 WHERE queue = $1
                 ORDER BY failed_at DESC, id DESC
                 LIMIT $2 OFFSET $3"
            ),
            get_failed: format!(
                "SELECT {FAILED_COLUMNS} FROM {failed} WHERE id = $1 AND queue = $2"
            ),
            forget_failed: format!("DELETE FROM {failed} WHERE id = $1 AND queue = $2"),
            claim_failed: format!(
                "DELETE FROM {failed} WHERE id = $1 AND queue = $2 RETURNING job_id, payload"
            ),
            flush_failed: format!("DELETE FROM {failed} WHERE queue = $1"),
        }
    }
}

/// A queue stored in PostgreSQL.
pub struct PgQueueConnection {
    pool: PgPool,
    queue: String,
    config: Arc<QueueConfig>,
    registry: Arc<JobRegistry>,
    tables: QueueTables,
    sql: Statements,
    /// Set when the connection opened its own pool; `close` then closes it.
    owns_pool: bool,
    closed: AtomicBool,
}

impl std::fmt::Debug for PgQueueConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgQueueConnection")
            .field("queue", &self.queue)
            .field("tables", &self.tables)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl PgQueueConnection {
    /// Bind `queue` to a shared pool. `close` leaves the pool open.
    pub fn new(
        pool: PgPool,
        queue: impl Into<String>,
        config: Arc<QueueConfig>,
        registry: Arc<JobRegistry>,
        tables: QueueTables,
    ) -> Result<Self> {
        let queue = queue.into();
        if queue.is_empty() {
            return Err(Error::InvalidInput("Queue name cannot be empty".to_string()));
        }
        tables.validate()?;
        let sql = Statements::render(&tables);
        Ok(Self {
            pool,
            queue,
            config,
            registry,
            tables,
            sql,
            owns_pool: false,
            closed: AtomicBool::new(false),
        })
    }

    /// Open a dedicated pool for `queue`. `close` closes it.
    pub async fn connect(
        database_url: &str,
        queue: impl Into<String>,
        config: Arc<QueueConfig>,
        registry: Arc<JobRegistry>,
        tables: QueueTables,
    ) -> Result<Self> {
        let queue = queue.into();
        let pool = crate::pool::open_pool(&queue, database_url, &PoolConfig::default()).await?;
        let mut conn = Self::new(pool, queue, config, registry, tables)?;
        conn.owns_pool = true;
        Ok(conn)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &QueueTables {
        &self.tables
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed(format!("queue '{}'", self.queue)));
        }
        Ok(())
    }

    fn parse_job_row(row: PgRow) -> Job {
        Job {
            id: row.get("id"),
            queue: row.get("queue"),
            payload: row.get("payload"),
            priority: row.get("priority"),
            unique_key: row.get("unique_key"),
            attempts: row.get("attempts"),
            created_at: row.get("created_at"),
            execute_at: row.get("execute_at"),
            reserved_at: row.get("reserved_at"),
            failed_at: row.get("failed_at"),
            last_executed_at: row.get("last_executed_at"),
        }
    }

    fn parse_failed_row(row: PgRow) -> Result<FailedJob> {
        let exception: JsonValue = row.get("exception");
        Ok(FailedJob {
            id: row.get("id"),
            queue: row.get("queue"),
            job_id: row.get("job_id"),
            payload: row.get("payload"),
            exception: serde_json::from_value(exception)?,
            failed_at: row.get("failed_at"),
        })
    }

    fn parse_recurring_row(row: PgRow) -> RecurringJob {
        RecurringJob {
            id: row.get("id"),
            queue: row.get("queue"),
            name: row.get("name"),
            cron: row.get("cron"),
            payload: row.get("payload"),
            priority: row.get("priority"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Id of an outstanding job with the same unique key, if any.
    async fn find_duplicate(
        &self,
        conn: &mut PgConnection,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let window_start = sub_duration(now, self.config.unique_jobs_expiration);
        sqlx::query_scalar(&self.sql.find_duplicate)
            .bind(&self.queue)
            .bind(key)
            .bind(window_start)
            .fetch_optional(conn)
            .await
            .map_err(Error::Store)
    }

    /// Insert on a connection taken from the pool.
    async fn insert_pooled(
        &self,
        job: NewJob,
        execute_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        self.ensure_open()?;
        let mut conn = self.pool.acquire().await.map_err(Error::Store)?;
        self.insert(&mut conn, job, execute_at, now).await
    }

    /// Dedup check and insert on `conn`, which may be inside a transaction.
    async fn insert(
        &self,
        conn: &mut PgConnection,
        job: NewJob,
        execute_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        self.ensure_open()?;

        let unique_key = job.unique_key.filter(|_| self.config.support_unique_jobs);
        if let Some(key) = unique_key.as_deref() {
            match self.find_duplicate(&mut *conn, key, now).await {
                Ok(Some(existing)) => {
                    debug!(
                        subsystem = "queue",
                        component = "pg_connection",
                        op = "push",
                        queue = %self.queue,
                        unique_key = %key,
                        job_id = %existing,
                        "Unique job already queued"
                    );
                    return Ok(existing);
                }
                Ok(None) => {}
                // Dedup is best-effort; a failed check must not lose the job.
                Err(e) => warn!(
                    subsystem = "queue",
                    component = "pg_connection",
                    op = "push",
                    queue = %self.queue,
                    unique_key = %key,
                    error = %e,
                    "Unique job check failed, inserting anyway"
                ),
            }
        }

        let id = new_v7();
        sqlx::query(&self.sql.insert_job)
            .bind(id)
            .bind(&self.queue)
            .bind(&job.payload)
            .bind(job.priority.unwrap_or(self.config.default_priority))
            .bind(unique_key.as_deref())
            .bind(now)
            .bind(execute_at)
            .execute(&mut *conn)
            .await
            .map_err(Error::Store)?;

        debug!(
            subsystem = "queue",
            component = "pg_connection",
            op = "push",
            queue = %self.queue,
            job_id = %id,
            job_name = %job.name,
            "Job queued"
        );
        Ok(id)
    }

    async fn reserve_next(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let candidate: Option<Uuid> = sqlx::query_scalar(&self.sql.select_next)
            .bind(&self.queue)
            .bind(now)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Store)?;

        let Some(id) = candidate else {
            return Ok(None);
        };

        let row = sqlx::query(&self.sql.reserve)
            .bind(now)
            .bind(id)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Store)?;
        Ok(Some(Self::parse_job_row(row)))
    }

    /// Claim the failed record, drop the original row and push the revived
    /// job in one transaction. `None` when the record is gone, which includes
    /// losing the claim to a concurrent retry.
    async fn requeue_failed(&self, id: Uuid) -> Result<Option<(Uuid, Uuid)>> {
        self.ensure_open()?;
        let mut tx = self.pool.begin().await.map_err(Error::Store)?;

        let claimed = sqlx::query(&self.sql.claim_failed)
            .bind(id)
            .bind(&self.queue)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Store)?;
        let Some(row) = claimed else {
            tx.rollback().await.map_err(Error::Store)?;
            return Ok(None);
        };
        let job_id: Uuid = row.get("job_id");
        let payload: JsonValue = row.get("payload");

        let job = match self.registry.hydrate(&payload) {
            Ok(job) => job,
            Err(e) => {
                tx.rollback().await.map_err(Error::Store)?;
                return Err(e);
            }
        };

        sqlx::query(&self.sql.remove)
            .bind(job_id)
            .bind(&self.queue)
            .execute(&mut *tx)
            .await
            .map_err(Error::Store)?;

        let now = Utc::now();
        let delay = job.delay.unwrap_or(self.config.default_delay);
        let execute_at = (!delay.is_zero()).then(|| add_duration(now, delay));
        let new_id = self.insert(&mut tx, job, execute_at, now).await?;

        tx.commit().await.map_err(Error::Store)?;
        Ok(Some((job_id, new_id)))
    }

    async fn try_store_failed(&self, job: &Job, failure: &FailureInfo) -> Result<()> {
        self.ensure_open()?;
        let now = Utc::now();
        let exception = serde_json::to_value(failure)?;

        let mut tx = self.pool.begin().await.map_err(Error::Store)?;
        sqlx::query(&self.sql.mark_failed)
            .bind(now)
            .bind(job.id)
            .bind(&self.queue)
            .execute(&mut *tx)
            .await
            .map_err(Error::Store)?;

        if self.config.store_failed_jobs {
            sqlx::query(&self.sql.upsert_failed)
                .bind(new_v7())
                .bind(&self.queue)
                .bind(job.id)
                .bind(&job.payload)
                .bind(exception)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(Error::Store)?;
        }
        tx.commit().await.map_err(Error::Store)?;
        Ok(())
    }
}

#[async_trait]
impl QueueConnection for PgQueueConnection {
    fn queue(&self) -> &str {
        &self.queue
    }

    fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    #[instrument(skip(self, job), fields(subsystem = "queue", component = "pg_connection", op = "push", queue = %self.queue))]
    async fn push(&self, job: NewJob) -> Result<Uuid> {
        let now = Utc::now();
        let delay = job.delay.unwrap_or(self.config.default_delay);
        let execute_at = (!delay.is_zero()).then(|| add_duration(now, delay));
        self.insert_pooled(job, execute_at, now).await
    }

    async fn schedule(&self, job: NewJob, execute_at: DateTime<Utc>) -> Result<Uuid> {
        self.insert_pooled(job, Some(execute_at), Utc::now()).await
    }

    #[instrument(skip(self), fields(subsystem = "queue", component = "pg_connection", op = "pop", queue = %self.queue))]
    async fn pop(&self) -> Result<Option<Job>> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Store)?;

        match self.reserve_next(&mut tx, now).await {
            Ok(job) => {
                tx.commit().await.map_err(Error::Store)?;
                match &job {
                    Some(job) => debug!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        "Job reserved"
                    ),
                    None => debug!("No eligible job"),
                }
                Ok(job)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback after failed pop also failed");
                }
                error!(error = %e, "Pop failed");
                Err(e)
            }
        }
    }

    async fn complete(&self, job_id: Uuid) -> Result<bool> {
        self.ensure_open()?;
        let result = sqlx::query(&self.sql.complete)
            .bind(Utc::now())
            .bind(job_id)
            .bind(&self.queue)
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, job_id: Uuid, delay: Duration) -> Result<bool> {
        self.ensure_open()?;
        let execute_at = add_duration(Utc::now(), delay);
        let result = sqlx::query(&self.sql.release)
            .bind(execute_at)
            .bind(job_id)
            .bind(&self.queue)
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, job_id: Uuid) -> Result<bool> {
        self.ensure_open()?;
        let result = sqlx::query(&self.sql.remove)
            .bind(job_id)
            .bind(&self.queue)
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        self.ensure_open()?;
        let row = sqlx::query(&self.sql.get)
            .bind(job_id)
            .bind(&self.queue)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(row.map(Self::parse_job_row))
    }

    async fn register_recurring_job(
        &self,
        job: NewJob,
        cron: &str,
        priority: Option<i32>,
    ) -> Result<Uuid> {
        self.ensure_open()?;
        let cron = relq_core::normalize_cron(cron)?;
        let priority = priority
            .or(job.priority)
            .unwrap_or(self.config.default_priority);

        let id: Uuid = sqlx::query_scalar(&self.sql.upsert_recurring)
            .bind(new_v7())
            .bind(&self.queue)
            .bind(&job.name)
            .bind(&cron)
            .bind(&job.payload)
            .bind(priority)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Store)?;

        info!(
            subsystem = "queue",
            component = "pg_connection",
            op = "register_recurring_job",
            queue = %self.queue,
            job_name = %job.name,
            cron = %cron,
            "Recurring job registered"
        );
        Ok(id)
    }

    async fn recurring_jobs(&self) -> Result<Vec<RecurringJob>> {
        self.ensure_open()?;
        let rows = sqlx::query(&self.sql.list_recurring)
            .bind(&self.queue)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(rows.into_iter().map(Self::parse_recurring_row).collect())
    }

    async fn remove_recurring_job(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        let result = sqlx::query(&self.sql.remove_recurring)
            .bind(&self.queue)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<QueueStats> {
        self.ensure_open()?;
        let row = sqlx::query(&self.sql.stats)
            .bind(&self.queue)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Store)?;
        log_pool_metrics(&self.pool, &self.queue);

        Ok(QueueStats {
            pending: row.get("pending"),
            reserved: row.get("reserved"),
            failed: row.get("failed"),
            delayed: row.get("delayed"),
            done: row.get("done"),
            recurring: row.get("recurring"),
        })
    }

    #[instrument(skip(self), fields(subsystem = "queue", component = "pg_connection", op = "prune", queue = %self.queue))]
    async fn prune(&self, max_age: Duration) -> Result<u64> {
        self.ensure_open()?;
        let cutoff = sub_duration(Utc::now(), max_age);

        let mut tx = self.pool.begin().await.map_err(Error::Store)?;
        let jobs = sqlx::query(&self.sql.prune_jobs)
            .bind(&self.queue)
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(Error::Store)?
            .rows_affected();
        let records = sqlx::query(&self.sql.prune_failed)
            .bind(&self.queue)
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(Error::Store)?
            .rows_affected();
        tx.commit().await.map_err(Error::Store)?;

        info!(
            rows_affected = jobs,
            failed_records = records,
            "Pruned old jobs"
        );
        Ok(jobs)
    }

    async fn clear(&self) -> Result<u64> {
        self.ensure_open()?;
        let removed = sqlx::query(&self.sql.clear)
            .bind(&self.queue)
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?
            .rows_affected();

        info!(
            subsystem = "queue",
            component = "pg_connection",
            op = "clear",
            queue = %self.queue,
            rows_affected = removed,
            "Queue cleared"
        );
        Ok(removed)
    }

    #[instrument(skip(self, job, failure), fields(subsystem = "queue", component = "pg_connection", op = "store_failed_job", queue = %self.queue, job_id = %job.id))]
    async fn store_failed_job(&self, job: &Job, failure: &FailureInfo) -> bool {
        match self.try_store_failed(job, failure).await {
            Ok(()) => {
                debug!(message = %failure.message, "Job marked failed");
                true
            }
            Err(e) => {
                error!(error = %e, "Could not store failed job");
                false
            }
        }
    }

    async fn failed_jobs(&self, limit: i64, offset: i64) -> Result<Vec<FailedJob>> {
        self.ensure_open()?;
        let rows = sqlx::query(&self.sql.list_failed)
            .bind(&self.queue)
            .bind(limit.max(0))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Store)?;
        rows.into_iter().map(Self::parse_failed_row).collect()
    }

    async fn get_failed_job(&self, id: Uuid) -> Result<Option<FailedJob>> {
        self.ensure_open()?;
        let row = sqlx::query(&self.sql.get_failed)
            .bind(id)
            .bind(&self.queue)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Store)?;
        row.map(Self::parse_failed_row).transpose()
    }

    async fn forget_failed_job(&self, id: Uuid) -> Result<bool> {
        self.ensure_open()?;
        let result = sqlx::query(&self.sql.forget_failed)
            .bind(id)
            .bind(&self.queue)
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(result.rows_affected() > 0)
    }

    /// Runs as one transaction: a failed push leaves the record and the
    /// original row in place.
    #[instrument(skip(self), fields(subsystem = "queue", component = "pg_connection", op = "retry_failed_job", queue = %self.queue))]
    async fn retry_failed_job(&self, id: Uuid) -> bool {
        match self.requeue_failed(id).await {
            Ok(Some((job_id, new_id))) => {
                info!(
                    failed_id = %id,
                    original_job_id = %job_id,
                    job_id = %new_id,
                    "Failed job pushed again"
                );
                true
            }
            Ok(None) => {
                debug!(failed_id = %id, "Failed job record not found");
                false
            }
            Err(e) => {
                warn!(failed_id = %id, error = %e, "Failed job could not be pushed again");
                false
            }
        }
    }

    async fn flush_failed_jobs(&self) -> Result<u64> {
        self.ensure_open()?;
        let result = sqlx::query(&self.sql.flush_failed)
            .bind(&self.queue)
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owns_pool {
            self.pool.close().await;
        }
        info!(
            subsystem = "queue",
            component = "pg_connection",
            op = "close",
            queue = %self.queue,
            "Connection closed"
        );
    }
}
