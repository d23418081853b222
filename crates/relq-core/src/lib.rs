//! # relq-core
//!
//! Core types, traits, and abstractions for the relq job queue.
//!
//! This crate provides the job model, the [`QueueJob`] trait typed jobs
//! implement, the [`JobRegistry`] used to revive stored payloads, retry
//! policies, per-queue configuration and the [`QueueConnection`] contract.
//! [`MemoryConnection`] is a complete in-process backend; the PostgreSQL
//! backend lives in `relq-db`.
//!
//! ## Logging
//!
//! Backends log through `tracing` with `subsystem = "queue"` plus `component`,
//! `op`, `queue` and `job_id` fields.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Store failure surfaced to the caller |
//! | WARN  | Recoverable issue: dedup check failed, retry hydration failed |
//! | INFO  | Lifecycle events: connection created or closed, prune and clear results |
//! | DEBUG | Push/pop decisions, dedup hits, empty queues |
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use relq_core::{
//!     JobRegistry, MemoryStore, QueueConfig, QueueConnection, QueueConnectionExt, QueueJob,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct SendEmail {
//!     to: String,
//! }
//!
//! impl QueueJob for SendEmail {
//!     const NAME: &'static str = "send_email";
//! }
//!
//! # tokio_test_block_on(async {
//! let registry = Arc::new(JobRegistry::new().with::<SendEmail>().unwrap());
//! let queue = MemoryStore::new().connection("emails", Arc::new(QueueConfig::default()), registry);
//!
//! let id = queue.push_job(&SendEmail { to: "a@example.com".into() }).await.unwrap();
//! let job = queue.pop().await.unwrap().unwrap();
//! assert_eq!(job.id, id);
//! queue.complete(job.id).await.unwrap();
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod config;
pub mod defaults;
pub mod error;
pub mod job;
pub mod memory;
pub mod models;
pub mod registry;
pub mod retry;
pub mod schedule;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use config::QueueConfig;
pub use error::{Error, Result};
pub use job::{decode_job, QueueJob};
pub use memory::{Clock, MemoryConnection, MemoryStore};
pub use models::*;
pub use registry::JobRegistry;
pub use retry::RetryStrategy;
pub use schedule::{next_run_after, normalize_cron};
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
