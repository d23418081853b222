//! Per-queue operational configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::add_duration;
use crate::retry::RetryStrategy;

/// Operational knobs for one queue.
///
/// Built once at startup and shared read-only (behind an `Arc`) by every
/// producer and worker of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Datastore connection identifier handed to the resolver.
    pub connection: String,
    /// Attempts allowed before a job stays failed.
    pub max_retries: i32,
    /// Base delay fed to the retry strategy.
    pub retry_delay: Duration,
    pub retry_strategy: RetryStrategy,
    /// Priority for jobs that do not set one.
    pub default_priority: i32,
    /// Delay for jobs that do not set one.
    pub default_delay: Duration,
    /// Whether `prune_expired` does anything.
    pub auto_prune: bool,
    /// Age cutoff used by `prune_expired`.
    pub max_age: Duration,
    /// Advisory; enforced by the worker loop, not the engine.
    pub max_execution_time: Duration,
    /// Whether failures are written to the failed-job store.
    pub store_failed_jobs: bool,
    /// Upper bound on jobs returned by `pop_batch`.
    pub batch_size: usize,
    /// Whether unique keys are honored on push.
    pub support_unique_jobs: bool,
    /// How long a failed unique job keeps blocking duplicates.
    pub unique_jobs_expiration: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            connection: defaults::CONNECTION_NAME.to_string(),
            max_retries: defaults::MAX_RETRIES,
            retry_delay: Duration::from_secs(defaults::RETRY_DELAY_SECS),
            retry_strategy: RetryStrategy::default(),
            default_priority: defaults::PRIORITY,
            default_delay: Duration::from_secs(defaults::DELAY_SECS),
            auto_prune: true,
            max_age: Duration::from_secs(defaults::MAX_AGE_SECS),
            max_execution_time: Duration::from_secs(defaults::MAX_EXECUTION_TIME_SECS),
            store_failed_jobs: true,
            batch_size: defaults::BATCH_SIZE,
            support_unique_jobs: true,
            unique_jobs_expiration: Duration::from_secs(defaults::UNIQUE_JOBS_EXPIRATION_SECS),
        }
    }
}

impl QueueConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables (with defaults).
    ///
    /// Every variable is looked up queue-specific first
    /// (`RELQ_<QUEUE>_<KEY>`, queue name upper-cased with `-` and `.` mapped to
    /// `_`), then global (`RELQ_<KEY>`).
    ///
    /// | Key | Default | Description |
    /// |-----|---------|-------------|
    /// | `CONNECTION` | `default` | Datastore connection identifier |
    /// | `MAX_RETRIES` | `3` | Attempts before a job stays failed |
    /// | `RETRY_DELAY_SECS` | `60` | Base retry delay |
    /// | `RETRY_STRATEGY` | `exponential` | `fixed`, `linear` or `exponential` |
    /// | `DEFAULT_PRIORITY` | `0` | Priority for jobs without one |
    /// | `DEFAULT_DELAY_SECS` | `0` | Delay for jobs without one |
    /// | `AUTO_PRUNE` | `true` | Enable `prune_expired` |
    /// | `MAX_AGE_SECS` | `604800` | Prune cutoff |
    /// | `MAX_EXECUTION_TIME_SECS` | `300` | Advisory execution limit |
    /// | `STORE_FAILED_JOBS` | `true` | Keep failed-job records |
    /// | `BATCH_SIZE` | `10` | `pop_batch` size |
    /// | `SUPPORT_UNIQUE_JOBS` | `true` | Honor unique keys |
    /// | `UNIQUE_JOBS_EXPIRATION_SECS` | `86400` | Dedup window for failed unique jobs |
    pub fn from_env(queue: &str) -> Result<Self> {
        Self::from_lookup(queue, |key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(queue: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = env_prefix(queue);
        let get = |key: &str| {
            lookup(&format!("RELQ_{}_{}", prefix, key)).or_else(|| lookup(&format!("RELQ_{}", key)))
        };
        let base = Self::default();

        let retry_strategy = match get("RETRY_STRATEGY") {
            Some(raw) => raw.parse()?,
            None => base.retry_strategy,
        };

        Ok(Self {
            connection: get("CONNECTION").unwrap_or(base.connection),
            max_retries: parse_or(get("MAX_RETRIES"), "MAX_RETRIES", base.max_retries)?,
            retry_delay: secs_or(get("RETRY_DELAY_SECS"), "RETRY_DELAY_SECS", base.retry_delay)?,
            retry_strategy,
            default_priority: parse_or(
                get("DEFAULT_PRIORITY"),
                "DEFAULT_PRIORITY",
                base.default_priority,
            )?,
            default_delay: secs_or(
                get("DEFAULT_DELAY_SECS"),
                "DEFAULT_DELAY_SECS",
                base.default_delay,
            )?,
            auto_prune: bool_or(get("AUTO_PRUNE"), base.auto_prune),
            max_age: secs_or(get("MAX_AGE_SECS"), "MAX_AGE_SECS", base.max_age)?,
            max_execution_time: secs_or(
                get("MAX_EXECUTION_TIME_SECS"),
                "MAX_EXECUTION_TIME_SECS",
                base.max_execution_time,
            )?,
            store_failed_jobs: bool_or(get("STORE_FAILED_JOBS"), base.store_failed_jobs),
            batch_size: parse_or::<usize>(get("BATCH_SIZE"), "BATCH_SIZE", base.batch_size)?
                .max(1),
            support_unique_jobs: bool_or(get("SUPPORT_UNIQUE_JOBS"), base.support_unique_jobs),
            unique_jobs_expiration: secs_or(
                get("UNIQUE_JOBS_EXPIRATION_SECS"),
                "UNIQUE_JOBS_EXPIRATION_SECS",
                base.unique_jobs_expiration,
            )?,
        })
    }

    /// Set the datastore connection identifier.
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }

    /// Set the maximum number of attempts.
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base retry delay and the strategy that scales it.
    pub fn with_retry(mut self, delay: Duration, strategy: RetryStrategy) -> Self {
        self.retry_delay = delay;
        self.retry_strategy = strategy;
        self
    }

    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Configure automatic pruning.
    pub fn with_auto_prune(mut self, enabled: bool, max_age: Duration) -> Self {
        self.auto_prune = enabled;
        self.max_age = max_age;
        self
    }

    pub fn with_max_execution_time(mut self, limit: Duration) -> Self {
        self.max_execution_time = limit;
        self
    }

    pub fn with_store_failed_jobs(mut self, enabled: bool) -> Self {
        self.store_failed_jobs = enabled;
        self
    }

    /// Set the `pop_batch` size (minimum 1).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Configure unique-job handling.
    pub fn with_unique_jobs(mut self, enabled: bool, expiration: Duration) -> Self {
        self.support_unique_jobs = enabled;
        self.unique_jobs_expiration = expiration;
        self
    }

    /// Whether a job that has been popped `attempts` times may run again.
    pub fn should_retry(&self, attempts: i32) -> bool {
        attempts < self.max_retries
    }

    /// Delay before the next attempt after `attempts` pops.
    pub fn retry_delay_for(&self, attempts: i32) -> Duration {
        Duration::from_secs(
            self.retry_strategy
                .delay(attempts, self.retry_delay.as_secs()),
        )
    }

    /// When the next attempt becomes eligible, measured from `now`.
    pub fn next_attempt_at(&self, attempts: i32, now: DateTime<Utc>) -> DateTime<Utc> {
        add_duration(now, self.retry_delay_for(attempts))
    }
}

fn env_prefix(queue: &str) -> String {
    queue
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {}: {}", key, v))),
        None => Ok(default),
    }
}

fn secs_or(raw: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_secs(parse_or(raw, key, default.as_secs())?))
}

fn bool_or(raw: Option<String>, default: bool) -> bool {
    raw.map(|v| v != "false" && v != "0").unwrap_or(default)
}
