//! Bounded retry for best-effort bus writes.
//!
//! Losing one servo or motor update must never stop the control loop, so
//! failures are logged here and turned into `None` instead of propagating.

use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};

use crate::utils::error::ConfigError;

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde(default)]
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// Actuator writes issued directly by a servo or drive.
    pub const DIRECT: RetryPolicy = RetryPolicy {
        attempts: 3,
        backoff_ms: 0,
    };

    /// Writes drained by the dispatch worker.
    pub const DISPATCH: RetryPolicy = RetryPolicy {
        attempts: 5,
        backoff_ms: 0,
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}

/// Run `op` until it succeeds or `policy.attempts` tries are used up.
///
/// Every failure is logged with `what` as context. Returns `None` once the
/// last attempt has failed; the error itself is swallowed.
pub fn retry<T, E, F>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Option<T>
where
    E: core::fmt::Debug,
    F: FnMut() -> Result<T, E>,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Some(value),
            Err(error) if attempt < attempts => {
                tracing::warn!(what, attempt, ?error, "write failed, retrying");
                if policy.backoff_ms > 0 {
                    thread::sleep(Duration::from_millis(policy.backoff_ms));
                }
            }
            Err(error) => {
                tracing::error!(what, attempt, ?error, "write dropped after final attempt");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_first_try() {
        let mut calls = 0;
        let out = retry(RetryPolicy::DIRECT, "test", || {
            calls += 1;
            Ok::<_, ()>(7)
        });
        assert_eq!(out, Some(7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn recovers_after_transient_failures() {
        let mut calls = 0;
        let out = retry(RetryPolicy::DIRECT, "test", || {
            calls += 1;
            if calls < 3 { Err("busy") } else { Ok(calls) }
        });
        assert_eq!(out, Some(3));
    }

    #[test]
    fn gives_up_after_policy_attempts() {
        let mut calls = 0;
        let out: Option<()> = retry(RetryPolicy::DISPATCH, "test", || {
            calls += 1;
            Err("nack")
        });
        assert_eq!(out, None);
        assert_eq!(calls, 5);
    }

    #[test]
    fn zero_attempts_rejected() {
        let policy = RetryPolicy {
            attempts: 0,
            backoff_ms: 0,
        };
        assert_eq!(policy.validate(), Err(ConfigError::ZeroAttempts));
    }
}
