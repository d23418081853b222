//! Table names used by the PostgreSQL backend.
//!
//! Names are interpolated into SQL, so every name passes through
//! [`validate_table_name`] before a connection will use it.

use serde::{Deserialize, Serialize};

use relq_core::defaults;
use relq_core::{Error, Result};

/// Names of the three queue tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTables {
    pub jobs: String,
    pub failed: String,
    pub recurring: String,
}

impl Default for QueueTables {
    fn default() -> Self {
        Self {
            jobs: defaults::JOBS_TABLE.to_string(),
            failed: defaults::FAILED_JOBS_TABLE.to_string(),
            recurring: defaults::RECURRING_JOBS_TABLE.to_string(),
        }
    }
}

impl QueueTables {
    /// Default names with `prefix` prepended, e.g. `tenant_a_queue_jobs`.
    pub fn with_prefix(prefix: &str) -> Self {
        let base = Self::default();
        Self {
            jobs: format!("{}{}", prefix, base.jobs),
            failed: format!("{}{}", prefix, base.failed),
            recurring: format!("{}{}", prefix, base.recurring),
        }
    }

    /// Read `RELQ_JOBS_TABLE`, `RELQ_FAILED_JOBS_TABLE` and
    /// `RELQ_RECURRING_JOBS_TABLE`, keeping defaults for unset names.
    pub fn from_env() -> Result<Self> {
        let mut tables = Self::default();
        if let Ok(name) = std::env::var("RELQ_JOBS_TABLE") {
            tables.jobs = name;
        }
        if let Ok(name) = std::env::var("RELQ_FAILED_JOBS_TABLE") {
            tables.failed = name;
        }
        if let Ok(name) = std::env::var("RELQ_RECURRING_JOBS_TABLE") {
            tables.recurring = name;
        }
        tables.validate()?;
        Ok(tables)
    }

    /// Check every name, and that the three names differ.
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.jobs)?;
        validate_table_name(&self.failed)?;
        validate_table_name(&self.recurring)?;
        if self.jobs == self.failed || self.jobs == self.recurring || self.failed == self.recurring
        {
            return Err(Error::Config(format!(
                "queue tables must have distinct names: {}, {}, {}",
                self.jobs, self.failed, self.recurring
            )));
        }
        Ok(())
    }
}

/// Validate a PostgreSQL table name for safe interpolation.
///
/// Table names must:
/// - Not be empty
/// - Not exceed 63 characters (PostgreSQL identifier limit)
/// - Contain only ASCII alphanumerics and underscores
/// - Start with a letter or underscore
/// - Not be a reserved keyword
///
/// ```
/// use relq_db::validate_table_name;
///
/// assert!(validate_table_name("queue_jobs").is_ok());
/// assert!(validate_table_name("jobs; DROP TABLE x").is_err());
/// assert!(validate_table_name("1jobs").is_err());
/// ```
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("Table name cannot be empty".to_string()));
    }

    if name.len() > 63 {
        return Err(Error::InvalidInput(format!(
            "Table name exceeds 63 character limit: {} characters",
            name.len()
        )));
    }

    if let Some(first) = name.chars().next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::InvalidInput(format!(
                "Table name must start with a letter or underscore, found: '{}'",
                first
            )));
        }
    }

    if let Some(ch) = name
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_')
    {
        return Err(Error::InvalidInput(format!(
            "Table name contains invalid character: '{}'. Only alphanumeric and underscore allowed",
            ch
        )));
    }

    const RESERVED_KEYWORDS: &[&str] = &[
        "select", "insert", "update", "delete", "drop", "create", "alter", "table", "from",
        "where", "grant", "revoke", "truncate", "user", "order", "group",
    ];

    if RESERVED_KEYWORDS.contains(&name.to_lowercase().as_str()) {
        return Err(Error::InvalidInput(format!(
            "Table name '{}' is a reserved SQL keyword",
            name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name_valid() {
        assert!(validate_table_name("queue_jobs").is_ok());
        assert!(validate_table_name("_private").is_ok());
        assert!(validate_table_name("Jobs2026").is_ok());
        assert!(validate_table_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_validate_table_name_invalid() {
        for name in ["", "9jobs", "queue-jobs", "jobs;drop", "public.jobs", "DROP"] {
            match validate_table_name(name) {
                Err(Error::InvalidInput(_)) => {}
                other => panic!("expected InvalidInput for {:?}, got {:?}", name, other),
            }
        }
        assert!(validate_table_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_default_tables() {
        let tables = QueueTables::default();
        assert_eq!(tables.jobs, "queue_jobs");
        assert_eq!(tables.failed, "queue_failed_jobs");
        assert_eq!(tables.recurring, "queue_recurring_jobs");
        assert!(tables.validate().is_ok());
    }

    #[test]
    fn test_with_prefix() {
        let tables = QueueTables::with_prefix("t1_");
        assert_eq!(tables.jobs, "t1_queue_jobs");
        assert_eq!(tables.recurring, "t1_queue_recurring_jobs");
        assert!(tables.validate().is_ok());
        assert!(QueueTables::with_prefix("bad prefix ").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_names() {
        let tables = QueueTables {
            jobs: "jobs".to_string(),
            failed: "jobs".to_string(),
            recurring: "recurring".to_string(),
        };
        assert!(matches!(tables.validate(), Err(Error::Config(_))));
    }
}
