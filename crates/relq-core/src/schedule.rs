//! Cron expression handling for recurring jobs.

use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use cron::Schedule;

use crate::error::{Error, Result};
use crate::models::RecurringJob;

/// Validate a cron expression and return it in the form stored on disk.
///
/// Classic five-field crontab lines (`min hour dom month dow`) get a leading
/// `0` seconds field; six and seven field expressions are kept as given.
pub fn normalize_cron(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!("0 {}", fields.join(" ")),
        6 | 7 => fields.join(" "),
        n => {
            return Err(Error::InvalidCron {
                expression: expression.to_string(),
                reason: format!("expected 5, 6 or 7 fields, found {}", n),
            })
        }
    };
    parse(&normalized).map_err(|e| match e {
        Error::InvalidCron { reason, .. } => Error::InvalidCron {
            expression: expression.to_string(),
            reason,
        },
        other => other,
    })?;
    Ok(normalized)
}

/// First fire time strictly after `after`.
pub fn next_run_after(expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let schedule = parse(&normalize_cron(expression)?)?;
    let base = after.with_nanosecond(0).unwrap_or(after);
    Ok(schedule.after(&base).next())
}

fn parse(expression: &str) -> Result<Schedule> {
    Schedule::from_str(expression).map_err(|e| Error::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

impl RecurringJob {
    /// Next fire time strictly after `after`, or `None` if the schedule is exhausted.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        next_run_after(&self.cron, after)
    }

    /// Whether the schedule fired in `(last_run, now]`.
    pub fn is_due(&self, last_run: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .next_run_after(last_run)?
            .is_some_and(|next| next <= now))
    }
}
