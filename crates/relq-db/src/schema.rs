//! Idempotent schema installer for the queue tables.

use sqlx::PgPool;
use tracing::info;

use relq_core::{Error, Result};

use crate::tables::QueueTables;

/// DDL statements for `tables`, in execution order.
pub fn schema_statements(tables: &QueueTables) -> Vec<String> {
    let QueueTables {
        jobs,
        failed,
        recurring,
    } = tables;

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {jobs} (
                id UUID PRIMARY KEY,
                queue TEXT NOT NULL,
                payload JSONB NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                unique_key TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                execute_at TIMESTAMPTZ,
                reserved_at TIMESTAMPTZ,
                failed_at TIMESTAMPTZ,
                last_executed_at TIMESTAMPTZ
            )"
        ),
        // Pop scans only rows nothing has touched yet.
        format!(
            "CREATE INDEX IF NOT EXISTS {jobs}_pop_idx
             ON {jobs} (queue, priority DESC, created_at, id)
             WHERE reserved_at IS NULL AND failed_at IS NULL AND last_executed_at IS NULL"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {jobs}_unique_key_idx
             ON {jobs} (queue, unique_key)
             WHERE unique_key IS NOT NULL"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {failed} (
                id UUID PRIMARY KEY,
                queue TEXT NOT NULL,
                job_id UUID NOT NULL,
                payload JSONB NOT NULL,
                exception JSONB NOT NULL,
                failed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {failed}_queue_job_idx
             ON {failed} (queue, job_id)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {recurring} (
                id UUID PRIMARY KEY,
                queue TEXT NOT NULL,
                name TEXT NOT NULL,
                cron TEXT NOT NULL,
                payload JSONB NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {recurring}_queue_name_idx
             ON {recurring} (queue, name)"
        ),
    ]
}

/// Create the queue tables and indexes if they do not exist.
pub async fn install(pool: &PgPool, tables: &QueueTables) -> Result<()> {
    tables.validate()?;

    let mut tx = pool.begin().await.map_err(Error::Store)?;
    for statement in schema_statements(tables) {
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(Error::Store)?;
    }
    tx.commit().await.map_err(Error::Store)?;

    info!(
        subsystem = "queue",
        component = "schema",
        op = "install",
        jobs_table = %tables.jobs,
        failed_table = %tables.failed,
        recurring_table = %tables.recurring,
        "Queue schema installed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_use_configured_names() {
        let tables = QueueTables::with_prefix("t_");
        let statements = schema_statements(&tables);
        assert_eq!(statements.len(), 7);
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS t_queue_jobs"));
        assert!(statements[3].contains("t_queue_failed_jobs"));
        assert!(statements[5].contains("t_queue_recurring_jobs"));
        assert!(statements
            .iter()
            .all(|s| s.contains("IF NOT EXISTS")));
    }

    #[test]
    fn test_unique_indexes_cover_upsert_keys() {
        let statements = schema_statements(&QueueTables::default());
        assert!(statements
            .iter()
            .any(|s| s.contains("UNIQUE INDEX") && s.contains("(queue, job_id)")));
        assert!(statements
            .iter()
            .any(|s| s.contains("UNIQUE INDEX") && s.contains("(queue, name)")));
    }
}
