//! Job type registry used to revive stored payloads.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::job::{decode_job, QueueJob};
use crate::models::{envelope_name, NewJob};

type Hydrator = Arc<dyn Fn(&JsonValue) -> Result<NewJob> + Send + Sync>;

/// Registry mapping logical job names to typed decoders.
///
/// Retrying a failed job goes through here: the stored envelope is decoded
/// into the registered type and serialized again, so the revived job carries
/// the unique key and priority its type reports today.
#[derive(Clone, Default)]
pub struct JobRegistry {
    hydrators: HashMap<&'static str, Hydrator>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job type under `J::NAME`.
    ///
    /// Fails if another type already claimed the name.
    pub fn register<J: QueueJob>(&mut self) -> Result<()> {
        if J::NAME.is_empty() {
            return Err(Error::InvalidInput("job name cannot be empty".to_string()));
        }
        if self.hydrators.contains_key(J::NAME) {
            return Err(Error::InvalidInput(format!(
                "job name '{}' is already registered",
                J::NAME
            )));
        }
        let hydrator: Hydrator = Arc::new(|payload| {
            let job: J = decode_job(payload)?;
            NewJob::from_job(&job)
        });
        self.hydrators.insert(J::NAME, hydrator);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<J: QueueJob>(mut self) -> Result<Self> {
        self.register::<J>()?;
        Ok(self)
    }

    /// Check if a job name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.hydrators.contains_key(name)
    }

    /// Registered job names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.hydrators.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.hydrators.is_empty()
    }

    /// Turn a stored envelope back into a pushable job.
    ///
    /// Unknown names and malformed payloads are rejected with
    /// [`Error::Hydration`].
    pub fn hydrate(&self, payload: &JsonValue) -> Result<NewJob> {
        let name = envelope_name(payload)
            .ok_or_else(|| Error::Hydration("payload has no string 'job' field".to_string()))?;
        let hydrator = self
            .hydrators
            .get(name)
            .ok_or_else(|| Error::Hydration(format!("job '{}' is not registered", name)))?;
        hydrator(payload)
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}
