//! Retry delay policies.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::defaults::MAX_RETRY_DELAY_SECS;
use crate::error::Error;

/// How the delay before the next attempt grows with the attempt count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Always `base`.
    Fixed,
    /// `base * attempt`.
    Linear,
    /// `base * 2^(attempt - 1)`.
    #[default]
    Exponential,
}

impl RetryStrategy {
    /// Delay in seconds before attempt number `attempt` may run again.
    ///
    /// Attempts below 1 count as 1. The result never exceeds
    /// [`MAX_RETRY_DELAY_SECS`].
    pub fn delay(&self, attempt: i32, base_delay_secs: u64) -> u64 {
        let attempt = attempt.max(1) as u64;
        let delay = match self {
            RetryStrategy::Fixed => base_delay_secs,
            RetryStrategy::Linear => base_delay_secs.saturating_mul(attempt),
            RetryStrategy::Exponential => {
                // 2^63 already saturates any nonzero base.
                let exponent = (attempt - 1).min(63) as u32;
                base_delay_secs.saturating_mul(1u64 << exponent)
            }
        };
        delay.min(MAX_RETRY_DELAY_SECS)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStrategy::Fixed => "fixed",
            RetryStrategy::Linear => "linear",
            RetryStrategy::Exponential => "exponential",
        }
    }
}

impl FromStr for RetryStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(RetryStrategy::Fixed),
            "linear" => Ok(RetryStrategy::Linear),
            "exponential" => Ok(RetryStrategy::Exponential),
            other => Err(Error::Config(format!("unknown retry strategy: {}", other))),
        }
    }
}

impl std::fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_ignores_attempt() {
        assert_eq!(RetryStrategy::Fixed.delay(1, 30), 30);
        assert_eq!(RetryStrategy::Fixed.delay(7, 30), 30);
    }

    #[test]
    fn test_linear_scales_with_attempt() {
        assert_eq!(RetryStrategy::Linear.delay(1, 30), 30);
        assert_eq!(RetryStrategy::Linear.delay(3, 30), 90);
    }

    #[test]
    fn test_exponential_doubles() {
        assert_eq!(RetryStrategy::Exponential.delay(1, 10), 10);
        assert_eq!(RetryStrategy::Exponential.delay(2, 10), 20);
        assert_eq!(RetryStrategy::Exponential.delay(4, 10), 80);
    }

    #[test]
    fn test_attempt_below_one_counts_as_one() {
        assert_eq!(RetryStrategy::Linear.delay(0, 15), 15);
        assert_eq!(RetryStrategy::Exponential.delay(-4, 15), 15);
    }

    #[test]
    fn test_delay_is_capped() {
        assert_eq!(
            RetryStrategy::Exponential.delay(200, 60),
            MAX_RETRY_DELAY_SECS
        );
        assert_eq!(
            RetryStrategy::Linear.delay(i32::MAX, u64::MAX),
            MAX_RETRY_DELAY_SECS
        );
        assert_eq!(
            RetryStrategy::Fixed.delay(1, MAX_RETRY_DELAY_SECS + 1),
            MAX_RETRY_DELAY_SECS
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("fixed".parse::<RetryStrategy>().unwrap(), RetryStrategy::Fixed);
        assert_eq!(
            " Linear ".parse::<RetryStrategy>().unwrap(),
            RetryStrategy::Linear
        );
        assert_eq!(
            "EXPONENTIAL".parse::<RetryStrategy>().unwrap(),
            RetryStrategy::Exponential
        );
        assert!("random".parse::<RetryStrategy>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for strategy in [
            RetryStrategy::Fixed,
            RetryStrategy::Linear,
            RetryStrategy::Exponential,
        ] {
            assert_eq!(
                strategy.to_string().parse::<RetryStrategy>().unwrap(),
                strategy
            );
        }
    }
}
