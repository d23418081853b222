//! Pools behind queue store connections.
//!
//! Every pool is opened through [`open_pool`] so the queue logs one line per
//! store it connects to, named after the connection (or queue) it serves.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use relq_core::{Error, Result};

/// Connections per pool unless `RELQ_DB_MAX_CONNECTIONS` says otherwise.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Seconds to wait for a pooled connection.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds an idle connection is kept.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Sizing and timeouts for a queue store pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Read `RELQ_DB_MAX_CONNECTIONS`, `RELQ_DB_ACQUIRE_TIMEOUT_SECS` and
    /// `RELQ_DB_IDLE_TIMEOUT_SECS`; unset keys keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let number = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|_| Error::Config(format!("{} is not a number: {}", key, v)))
                })
                .transpose()
        };

        let mut config = Self::default();
        if let Some(n) = number("RELQ_DB_MAX_CONNECTIONS")? {
            if n == 0 || n > u32::MAX as u64 {
                return Err(Error::Config(format!(
                    "RELQ_DB_MAX_CONNECTIONS out of range: {}",
                    n
                )));
            }
            config.max_connections = n as u32;
        }
        if let Some(secs) = number("RELQ_DB_ACQUIRE_TIMEOUT_SECS")? {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = number("RELQ_DB_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Open the pool serving `name` (a connection name or a queue).
pub async fn open_pool(name: &str, database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Store)?;

    info!(
        subsystem = "queue",
        component = "pool",
        op = "open",
        connection = %name,
        max_connections = config.max_connections,
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Queue store pool opened"
    );
    Ok(pool)
}

/// Log pool usage for `queue`; warn when every connection is busy.
pub fn log_pool_metrics(pool: &PgPool, queue: &str) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "queue",
        component = "pool",
        op = "metrics",
        queue = %queue,
        pool_size = size,
        pool_idle = idle,
        "Queue store pool usage"
    );

    if pool_saturated(size, idle) {
        warn!(
            subsystem = "queue",
            component = "pool",
            queue = %queue,
            pool_size = size,
            "Queue store pool has no idle connections"
        );
    }
}

fn pool_saturated(size: u32, idle: usize) -> bool {
    size > 0 && idle == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults_when_unset() {
        let config = PoolConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = PoolConfig::from_lookup(lookup(&[
            ("RELQ_DB_MAX_CONNECTIONS", "25"),
            ("RELQ_DB_ACQUIRE_TIMEOUT_SECS", " 5 "),
            ("RELQ_DB_IDLE_TIMEOUT_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        for (key, value) in [
            ("RELQ_DB_MAX_CONNECTIONS", "0"),
            ("RELQ_DB_MAX_CONNECTIONS", "lots"),
            ("RELQ_DB_ACQUIRE_TIMEOUT_SECS", "-1"),
        ] {
            match PoolConfig::from_lookup(lookup(&[(key, value)])) {
                Err(Error::Config(msg)) => assert!(msg.contains(key)),
                other => panic!("expected Config error for {}={}, got {:?}", key, value, other),
            }
        }
    }

    #[test]
    fn test_pool_saturated_only_when_busy() {
        assert!(pool_saturated(4, 0));
        assert!(!pool_saturated(4, 1));
        assert!(!pool_saturated(0, 0));
    }
}
