use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded retry with quadratic backoff: `base + attempt² × step`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub step_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 20_000,
            step_delay_ms: 20_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            step_delay_ms: 0,
        }
    }

    /// Delay after the failed 0-indexed `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let squared = u64::from(attempt).saturating_mul(u64::from(attempt));
        let millis = self
            .base_delay_ms
            .saturating_add(squared.saturating_mul(self.step_delay_ms));
        Duration::from_millis(millis)
    }

    /// Run `attempt` until it yields a value or the budget is spent.
    ///
    /// Returns `Ok(None)` on exhaustion. Errors from `attempt` abort at once.
    /// No sleep follows the final attempt.
    pub fn run<T>(
        &self,
        mut attempt: impl FnMut(u32) -> anyhow::Result<Option<T>>,
    ) -> anyhow::Result<Option<T>> {
        for n in 0..self.max_attempts {
            if let Some(value) = attempt(n)? {
                return Ok(Some(value));
            }
            if n + 1 < self.max_attempts {
                let delay = self.backoff(n);
                tracing::warn!(attempt = n + 1, max = self.max_attempts, ?delay, "attempt failed; backing off");
                std::thread::sleep(delay);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_quadratically() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(20));
        assert_eq!(policy.backoff(1), Duration::from_secs(40));
        assert_eq!(policy.backoff(3), Duration::from_secs(200));
        assert_eq!(policy.backoff(9), Duration::from_secs(1640));
    }

    #[test]
    fn run_stops_at_first_success() -> anyhow::Result<()> {
        let mut calls = 0;
        let value = RetryPolicy::immediate(10).run(|n| {
            calls += 1;
            Ok((n == 2).then_some("ok"))
        })?;
        assert_eq!(value, Some("ok"));
        assert_eq!(calls, 3);
        Ok(())
    }

    #[test]
    fn run_exhausts_budget() -> anyhow::Result<()> {
        let mut calls = 0;
        let value: Option<()> = RetryPolicy::immediate(4).run(|_| {
            calls += 1;
            Ok(None)
        })?;
        assert_eq!(value, None);
        assert_eq!(calls, 4);
        Ok(())
    }

    #[test]
    fn run_propagates_errors() {
        let result: anyhow::Result<Option<()>> =
            RetryPolicy::immediate(4).run(|_| anyhow::bail!("navigation failed"));
        assert!(result.is_err());
    }
}
