//! # relq-db
//!
//! PostgreSQL backend for the relq job queue.
//!
//! This crate provides:
//! - [`PgQueueConnection`], a [`QueueConnection`] whose `pop` reserves jobs
//!   with `FOR UPDATE SKIP LOCKED` inside a transaction
//! - [`ConnectionFactory`] and the [`StoreResolver`] seam it resolves pools through
//! - Configurable, validated table names and an idempotent schema installer
//! - Connection pool management
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relq_db::{ConnectionFactory, FactoryConfig, PoolRegistry, QueueConfig, QueueConnectionExt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = ConnectionFactory::new(
//!         Arc::new(PoolRegistry::from_env()?),
//!         FactoryConfig::from_env()?.with_install_schema(true),
//!     )
//!     .with_registry(Arc::new(registry()));
//!
//!     let queue = factory.make("emails", QueueConfig::from_env("emails")?).await?;
//!     queue.push_job(&SendEmail { to: "a@example.com".into() }).await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod factory;
pub mod pool;
pub mod schema;
pub mod tables;

// Always compiled so integration tests (in tests/) can use it.
pub mod test_fixtures;

// Re-export core types
pub use relq_core::*;

pub use connection::PgQueueConnection;
pub use factory::{ConnectionFactory, FactoryConfig, PoolRegistry, StoreResolver};
pub use pool::{log_pool_metrics, open_pool, PoolConfig};
pub use schema::{install, schema_statements};
pub use tables::{validate_table_name, QueueTables};
