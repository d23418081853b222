//! The contract typed job payloads implement.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::models::{envelope, NewJob, PAYLOAD_DATA_KEY};

/// A typed unit of deferred work.
///
/// Serde provides the round trip: the fields serialize into the payload
/// envelope at push time and deserialize back when a failed job is retried.
///
/// ```
/// use relq_core::{NewJob, QueueJob};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct SendWelcome {
///     user_id: u64,
/// }
///
/// impl QueueJob for SendWelcome {
///     const NAME: &'static str = "send_welcome";
///
///     fn unique_key(&self) -> Option<String> {
///         Some(format!("welcome:{}", self.user_id))
///     }
/// }
///
/// let job = NewJob::from_job(&SendWelcome { user_id: 42 }).unwrap();
/// assert_eq!(job.unique_key.as_deref(), Some("welcome:42"));
/// ```
pub trait QueueJob: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Logical name of the job.
    ///
    /// This MUST be unique across every job registered with a `JobRegistry`.
    const NAME: &'static str;

    /// Deduplication key. `Some` makes the job unique within its queue.
    ///
    /// Must depend only on the job's own fields.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Priority override; `None` uses the queue default.
    fn priority(&self) -> Option<i32> {
        None
    }

    /// Delay override; `None` uses the queue default.
    fn delay(&self) -> Option<std::time::Duration> {
        None
    }
}

impl NewJob {
    /// Serialize a typed job into a pushable `NewJob`.
    pub fn from_job<J: QueueJob>(job: &J) -> Result<Self> {
        let data = serde_json::to_value(job)?;
        Ok(Self {
            name: J::NAME.to_string(),
            payload: envelope(J::NAME, data),
            unique_key: job.unique_key(),
            priority: job.priority(),
            delay: job.delay(),
        })
    }
}

/// Decode the `data` part of an envelope into `J`.
pub fn decode_job<J: QueueJob>(payload: &JsonValue) -> Result<J> {
    let data = payload.get(PAYLOAD_DATA_KEY).ok_or_else(|| {
        Error::Hydration(format!("payload for '{}' has no 'data' field", J::NAME))
    })?;
    serde_json::from_value(data.clone())
        .map_err(|e| Error::Hydration(format!("malformed payload for '{}': {}", J::NAME, e)))
}
