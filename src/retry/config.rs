//! Serde support for retry policies (feature-gated)
//!
//! Policies deserialize from plain millisecond fields and are validated on the
//! way in, so a bad config file fails at load time instead of mid-retry.
//!
//! # Example
//!
//! ```rust,ignore
//! use backoff_verify::RetryPolicy;
//!
//! let json = r#"{"base_backoff_ms": 5000, "max_retries": 10, "initial_delay_ms": 10000}"#;
//! let policy: RetryPolicy = serde_json::from_str(json).unwrap();
//! assert_eq!(policy, RetryPolicy::block_explorer());
//!
//! // Negative values are rejected
//! let bad = r#"{"max_retries": -1}"#;
//! assert!(serde_json::from_str::<RetryPolicy>(bad).is_err());
//! ```

use serde::Deserialize;
use std::time::Duration;

use super::error::PolicyError;
use super::policy::{RetryPolicy, DEFAULT_BASE_BACKOFF, DEFAULT_MAX_RETRIES};

/// Raw, unvalidated shape of a policy as it appears in config.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PolicyConfig {
    base_backoff_ms: i64,
    max_retries: i64,
    initial_delay_ms: i64,
    max_delay_ms: Option<i64>,
    jitter: Option<f64>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: DEFAULT_BASE_BACKOFF.as_millis() as i64,
            max_retries: i64::from(DEFAULT_MAX_RETRIES),
            initial_delay_ms: 0,
            max_delay_ms: None,
            jitter: None,
        }
    }
}

impl TryFrom<PolicyConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(raw: PolicyConfig) -> Result<Self, Self::Error> {
        let mut policy =
            RetryPolicy::from_millis(raw.base_backoff_ms, raw.max_retries, raw.initial_delay_ms)?;

        if let Some(ms) = raw.max_delay_ms {
            let max = u64::try_from(ms).map_err(|_| PolicyError::NegativeDuration {
                field: "max_delay_ms",
                value: ms,
            })?;
            policy = policy.with_max_delay(Duration::from_millis(max));
        }

        if let Some(factor) = raw.jitter {
            if !(0.0..=1.0).contains(&factor) {
                return Err(PolicyError::InvalidJitter(factor));
            }
            policy = policy.with_jitter(factor);
        }

        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::JitterStrategy;

    #[test]
    fn test_deserialize_explorer_policy() {
        let json = r#"{"base_backoff_ms": 5000, "max_retries": 10, "initial_delay_ms": 10000}"#;
        let policy: RetryPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy, RetryPolicy::block_explorer());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn test_optional_cap_and_jitter() {
        let json = r#"{"max_delay_ms": 2000, "jitter": 0.2}"#;
        let policy: RetryPolicy = serde_json::from_str(json).unwrap();

        assert_eq!(policy.max_delay(), Some(Duration::from_secs(2)));
        assert_eq!(policy.jitter(), &JitterStrategy::Proportional(0.2));
    }

    #[test]
    fn test_negative_retry_count_fails_at_load() {
        let err = serde_json::from_str::<RetryPolicy>(r#"{"max_retries": -1}"#).unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_negative_delay_fails_at_load() {
        let err = serde_json::from_str::<RetryPolicy>(r#"{"max_delay_ms": -5}"#).unwrap_err();
        assert!(err.to_string().contains("max_delay_ms"));
    }

    #[test]
    fn test_out_of_range_jitter_fails_at_load() {
        let result = serde_json::from_str::<RetryPolicy>(r#"{"jitter": 1.5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = serde_json::from_str::<RetryPolicy>(r#"{"retries": 3}"#);
        assert!(result.is_err());
    }
}
