//! Core data models for relq.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Envelope key holding the logical job name.
pub const PAYLOAD_JOB_KEY: &str = "job";

/// Envelope key holding the serialized job fields.
pub const PAYLOAD_DATA_KEY: &str = "data";

// =============================================================================
// JOB
// =============================================================================

/// Lifecycle state of a job row, derived from its timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Eligible for `pop`.
    Pending,
    /// Pending, but `execute_at` is still in the future.
    Delayed,
    /// Claimed by a worker.
    Reserved,
    /// Finished successfully.
    Completed,
    /// Moved to the failed-job store.
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Delayed => "delayed",
            JobState::Reserved => "reserved",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job row as stored in the jobs table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: String,
    /// Envelope `{"job": <name>, "data": <fields>}`.
    pub payload: JsonValue,
    /// Higher values dequeue first.
    pub priority: i32,
    pub unique_key: Option<String>,
    /// Incremented on every `pop`.
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    /// `None` means eligible immediately.
    pub execute_at: Option<DateTime<Utc>>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Derive the lifecycle state as of `now`.
    ///
    /// Failure wins over completion, completion over reservation.
    pub fn state_at(&self, now: DateTime<Utc>) -> JobState {
        if self.failed_at.is_some() {
            JobState::Failed
        } else if self.last_executed_at.is_some() {
            JobState::Completed
        } else if self.reserved_at.is_some() {
            JobState::Reserved
        } else if self.execute_at.is_some_and(|at| at > now) {
            JobState::Delayed
        } else {
            JobState::Pending
        }
    }

    /// Derive the lifecycle state as of the current time.
    pub fn state(&self) -> JobState {
        self.state_at(Utc::now())
    }

    /// True if `pop` may hand this job out at `now`.
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == JobState::Pending
    }

    /// Logical job name recorded in the payload envelope.
    pub fn job_name(&self) -> Option<&str> {
        envelope_name(&self.payload)
    }

    /// Serialized job fields from the payload envelope.
    pub fn data(&self) -> Option<&JsonValue> {
        self.payload.get(PAYLOAD_DATA_KEY)
    }

    /// Whether this row stops a new push with the same unique key.
    ///
    /// Completed rows never block. Failed rows block until `window` has
    /// passed since they failed.
    pub fn blocks_unique_push(&self, now: DateTime<Utc>, window: std::time::Duration) -> bool {
        if self.last_executed_at.is_some() && self.failed_at.is_none() {
            return false;
        }
        match self.failed_at {
            None => true,
            Some(failed_at) => failed_at > sub_duration(now, window),
        }
    }
}

/// A job ready to be pushed, produced from a typed job or assembled by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    /// Logical name, also used to key recurring registrations.
    pub name: String,
    /// Envelope `{"job": <name>, "data": <fields>}`.
    pub payload: JsonValue,
    /// `Some` marks the job as unique within its queue.
    pub unique_key: Option<String>,
    /// Overrides the queue's default priority.
    pub priority: Option<i32>,
    /// Overrides the queue's default delay.
    pub delay: Option<std::time::Duration>,
}

impl NewJob {
    /// Build a job from a logical name and its serialized fields.
    pub fn new(name: impl Into<String>, data: JsonValue) -> Self {
        let name = name.into();
        let payload = envelope(&name, data);
        Self {
            name,
            payload,
            unique_key: None,
            priority: None,
            delay: None,
        }
    }

    /// Rebuild a job from a stored envelope.
    pub fn from_payload(payload: JsonValue) -> Result<Self> {
        let name = envelope_name(&payload)
            .ok_or_else(|| {
                Error::Hydration("payload has no string 'job' field".to_string())
            })?
            .to_string();
        if payload.get(PAYLOAD_DATA_KEY).is_none() {
            return Err(Error::Hydration(format!(
                "payload for '{}' has no 'data' field",
                name
            )));
        }
        Ok(Self {
            name,
            payload,
            unique_key: None,
            priority: None,
            delay: None,
        })
    }

    /// Mark the job as unique under `key`.
    pub fn with_unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = Some(key.into());
        self
    }

    /// Set an explicit priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set an explicit delay before the job becomes eligible.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn is_unique(&self) -> bool {
        self.unique_key.is_some()
    }
}

/// Wrap serialized job fields in the payload envelope.
pub fn envelope(name: &str, data: JsonValue) -> JsonValue {
    json!({ PAYLOAD_JOB_KEY: name, PAYLOAD_DATA_KEY: data })
}

/// Read the logical job name out of an envelope.
pub fn envelope_name(payload: &JsonValue) -> Option<&str> {
    payload.get(PAYLOAD_JOB_KEY).and_then(JsonValue::as_str)
}

// =============================================================================
// FAILED JOBS
// =============================================================================

/// What went wrong when a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub message: String,
    pub trace: String,
}

impl FailureInfo {
    pub fn new(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: trace.into(),
        }
    }

    /// Capture an error and its `source()` chain, one cause per trace line.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut trace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            trace: trace.join("\n"),
        }
    }
}

/// A record in the failed-job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    pub id: Uuid,
    pub queue: String,
    /// Id of the jobs-table row that failed.
    pub job_id: Uuid,
    pub payload: JsonValue,
    pub exception: FailureInfo,
    pub failed_at: DateTime<Utc>,
}

// =============================================================================
// RECURRING JOBS
// =============================================================================

/// A cron-scheduled job template, unique per `(queue, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringJob {
    pub id: Uuid,
    pub queue: String,
    pub name: String,
    /// Normalized six or seven field expression.
    pub cron: String,
    pub payload: JsonValue,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringJob {
    /// The job to push when this definition fires.
    pub fn to_new_job(&self) -> Result<NewJob> {
        Ok(NewJob::from_payload(self.payload.clone())?.with_priority(self.priority))
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Per-queue counts, computed at call time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub reserved: i64,
    pub failed: i64,
    pub delayed: i64,
    pub done: i64,
    pub recurring: i64,
}

// =============================================================================
// TIME HELPERS
// =============================================================================

/// `t + d`, saturating at the latest representable instant.
pub fn add_duration(t: DateTime<Utc>, d: std::time::Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| t.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `t - d`, saturating at the earliest representable instant.
pub fn sub_duration(t: DateTime<Utc>, d: std::time::Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| t.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_job() -> Job {
        Job {
            id: Uuid::now_v7(),
            queue: "emails".to_string(),
            payload: envelope("send_email", json!({"to": "a@example.com"})),
            priority: 0,
            unique_key: None,
            attempts: 0,
            created_at: Utc::now(),
            execute_at: None,
            reserved_at: None,
            failed_at: None,
            last_executed_at: None,
        }
    }

    #[test]
    fn test_state_pending_and_delayed() {
        let now = Utc::now();
        let mut job = sample_job();
        assert_eq!(job.state_at(now), JobState::Pending);

        job.execute_at = Some(now + TimeDelta::seconds(30));
        assert_eq!(job.state_at(now), JobState::Delayed);
        assert_eq!(
            job.state_at(now + TimeDelta::seconds(30)),
            JobState::Pending
        );
    }

    #[test]
    fn test_state_precedence() {
        let now = Utc::now();
        let mut job = sample_job();
        job.reserved_at = Some(now);
        assert_eq!(job.state_at(now), JobState::Reserved);

        job.last_executed_at = Some(now);
        assert_eq!(job.state_at(now), JobState::Completed);

        job.failed_at = Some(now);
        assert_eq!(job.state_at(now), JobState::Failed);
    }

    #[test]
    fn test_blocks_unique_push() {
        let now = Utc::now();
        let window = Duration::from_secs(3600);
        let mut job = sample_job();
        assert!(job.blocks_unique_push(now, window));

        job.reserved_at = Some(now);
        assert!(job.blocks_unique_push(now, window));

        job.failed_at = Some(now - TimeDelta::minutes(10));
        assert!(job.blocks_unique_push(now, window));

        job.failed_at = Some(now - TimeDelta::hours(2));
        assert!(!job.blocks_unique_push(now, window));

        job.failed_at = None;
        job.last_executed_at = Some(now);
        assert!(!job.blocks_unique_push(now, window));
    }

    #[test]
    fn test_job_name_and_data() {
        let job = sample_job();
        assert_eq!(job.job_name(), Some("send_email"));
        assert_eq!(job.data(), Some(&json!({"to": "a@example.com"})));
    }

    #[test]
    fn test_new_job_from_payload_requires_envelope() {
        assert!(NewJob::from_payload(json!({"data": {}})).is_err());
        assert!(NewJob::from_payload(json!({"job": "x"})).is_err());
        assert!(NewJob::from_payload(json!({"job": 5, "data": {}})).is_err());

        let job = NewJob::from_payload(envelope("x", json!({"n": 1}))).unwrap();
        assert_eq!(job.name, "x");
        assert!(!job.is_unique());
    }

    #[test]
    fn test_new_job_builders() {
        let job = NewJob::new("report", json!({}))
            .with_unique_key("report:7")
            .with_priority(9)
            .with_delay(Duration::from_secs(5));
        assert!(job.is_unique());
        assert_eq!(job.priority, Some(9));
        assert_eq!(job.delay, Some(Duration::from_secs(5)));
        assert_eq!(job.payload["job"], "report");
    }

    #[derive(Debug)]
    struct Outer(Inner);
    #[derive(Debug)]
    struct Inner;

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "outer failed")
        }
    }
    impl std::fmt::Display for Inner {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "inner failed")
        }
    }
    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }
    impl std::error::Error for Inner {}

    #[test]
    fn test_failure_info_from_error_walks_sources() {
        let info = FailureInfo::from_error(&Outer(Inner));
        assert_eq!(info.message, "outer failed");
        assert_eq!(info.trace, "caused by: inner failed");
    }

    #[test]
    fn test_duration_helpers_saturate() {
        let now = Utc::now();
        assert_eq!(
            add_duration(now, Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MAX_UTC
        );
        assert_eq!(
            sub_duration(now, Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MIN_UTC
        );
        assert_eq!(
            add_duration(now, Duration::from_secs(60)),
            now + TimeDelta::seconds(60)
        );
    }

    #[test]
    fn test_queue_stats_serialization() {
        let stats = QueueStats {
            pending: 1,
            reserved: 2,
            failed: 3,
            delayed: 4,
            done: 5,
            recurring: 6,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["pending"], 1);
        assert_eq!(json["recurring"], 6);
    }
}
