/// Bounded retry for flaky external operations (downloads, apt, pip).
use super::config::RetryConfig;
use crate::provisioner::ProvisionError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached.
///
/// `op` receives the 1-based attempt number. A fixed `policy.delay` separates
/// attempts. Precondition errors are returned immediately. On exhaustion the
/// error is [`ProvisionError::RetriesExhausted`] naming `operation`.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, ProvisionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProvisionError>>,
{
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tracing::info!(
                "[Retry] Retrying {} (attempt {}/{}) in {}s",
                operation,
                attempt,
                policy.max_attempts,
                policy.delay.as_secs()
            );
            tokio::time::sleep(policy.delay).await;
        }

        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(
                        "[Retry] {} succeeded on attempt {}/{}",
                        operation,
                        attempt,
                        policy.max_attempts
                    );
                }
                return Ok(value);
            }
            Err(e) if e.is_precondition() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "[Retry] {} attempt {}/{} failed: {}",
                    operation,
                    attempt,
                    policy.max_attempts,
                    e
                );
                last_error = e.to_string();
            }
        }
    }

    tracing::error!(
        "[Retry] {} gave up after {} attempts",
        operation,
        policy.max_attempts
    );
    Err(ProvisionError::RetriesExhausted {
        operation: operation.to_string(),
        attempts: policy.max_attempts,
        last_error,
    })
}
