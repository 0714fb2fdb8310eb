//! Stage dispatch retry policy.

use crate::activities::{StageError, StageErrorKind, StageKind};
use crate::config::RetrySettings;
use std::future::Future;
use std::time::Duration;

/// Backoff and attempt bounds applied to one stage dispatch.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Backoff before the first retry.
    pub initial_interval: Duration,
    /// Backoff ceiling.
    pub max_interval: Duration,
    /// Maximum attempts for transient failures.
    pub max_attempts: u32,
    /// Per-attempt execution timeout.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Build a policy from the configured retry settings.
    pub fn from_settings(settings: RetrySettings) -> Self {
        Self {
            initial_interval: Duration::from_secs(settings.initial_backoff_secs),
            max_interval: Duration::from_secs(settings.max_backoff_secs),
            max_attempts: settings.max_attempts.max(1),
            attempt_timeout: Duration::from_secs(settings.attempt_timeout_secs),
        }
    }

    /// Backoff before retrying after the given 1-based attempt: the initial
    /// interval doubled per prior attempt, capped at the ceiling.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doubled = self
            .initial_interval
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));
        doubled.min(self.max_interval)
    }

    fn attempt_cap(&self, kind: StageErrorKind) -> u32 {
        match kind {
            StageErrorKind::Input => 1,
            // A deterministic mismatch gets one more chance, then gives up.
            StageErrorKind::DataConsistency => 2,
            StageErrorKind::Transient => self.max_attempts,
        }
    }
}

/// Run `op` under the policy, retrying per the error class of each failure.
///
/// `attempts` is incremented for every attempt made, including the final
/// failing one, so run snapshots reflect consumed attempts accurately.
pub async fn execute_with_retry<T, F, Fut>(
    stage: StageKind,
    policy: &RetryPolicy,
    attempts: &mut u32,
    op: F,
) -> Result<T, StageError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        *attempts += 1;

        let outcome = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Transient(format!(
                "Stage {stage} timed out after {}s",
                policy.attempt_timeout.as_secs()
            ))),
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let cap = policy.attempt_cap(error.kind());
        if attempt >= cap {
            if cap > 1 {
                tracing::error!(%stage, attempt, error = %error, "Stage exhausted its retries");
            }
            return Err(error);
        }

        let backoff = policy.backoff(attempt);
        tracing::warn!(
            %stage,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "Stage attempt failed, retrying"
        );
        tokio::time::sleep(backoff).await;
    }
}
