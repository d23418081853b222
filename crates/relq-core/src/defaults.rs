//! Centralized default constants for relq.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates should reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// QUEUE
// =============================================================================

/// Queue name used when none is given.
pub const QUEUE_NAME: &str = "default";

/// Datastore connection identifier resolved by the factory.
pub const CONNECTION_NAME: &str = "default";

/// Maximum attempts before a job is considered permanently failed.
pub const MAX_RETRIES: i32 = 3;

/// Base retry delay in seconds.
pub const RETRY_DELAY_SECS: u64 = 60;

/// Upper bound for any computed retry delay (one day).
pub const MAX_RETRY_DELAY_SECS: u64 = 86_400;

/// Priority assigned when neither the job nor the caller sets one.
pub const PRIORITY: i32 = 0;

/// Delay applied to plain pushes, in seconds.
pub const DELAY_SECS: u64 = 0;

/// Age after which completed and failed rows are pruned (seven days).
pub const MAX_AGE_SECS: u64 = 604_800;

/// Advisory execution limit for a single job, in seconds.
pub const MAX_EXECUTION_TIME_SECS: u64 = 300;

/// Jobs reserved per `pop_batch` call.
pub const BATCH_SIZE: usize = 10;

/// Window during which a failed unique job still blocks duplicates (24 hours).
pub const UNIQUE_JOBS_EXPIRATION_SECS: u64 = 86_400;

// =============================================================================
// TABLES
// =============================================================================

/// Pending/reserved/completed job rows.
pub const JOBS_TABLE: &str = "queue_jobs";

/// Failed-job quarantine.
pub const FAILED_JOBS_TABLE: &str = "queue_failed_jobs";

/// Recurring job definitions.
pub const RECURRING_JOBS_TABLE: &str = "queue_recurring_jobs";

// =============================================================================
// LISTING
// =============================================================================

/// Default page size for failed-job listings.
pub const PAGE_LIMIT: i64 = 50;
