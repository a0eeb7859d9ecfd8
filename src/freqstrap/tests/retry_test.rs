//! Retry combinator tests

use freqstrap::bootstrap::{retry, RetryPolicy};
use freqstrap::ProvisionError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn flaky(detail: &str) -> ProvisionError {
    ProvisionError::Command {
        command: "apt-get update".to_string(),
        exit_code: 100,
        detail: detail.to_string(),
    }
}

#[tokio::test]
async fn test_succeeds_after_transient_failures() {
    let policy = RetryPolicy::new(3, Duration::ZERO);
    let calls = AtomicU32::new(0);

    let value = retry(&policy, "download", |attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < 3 {
                Err(flaky("temporary failure resolving archive.ubuntu.com"))
            } else {
                Ok(attempt)
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(value, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhaustion_names_operation_and_attempts() {
    let policy = RetryPolicy::new(3, Duration::ZERO);
    let calls = AtomicU32::new(0);

    let err = retry(&policy, "pip install freqtrade", |attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Err::<(), _>(flaky(&format!("attempt {}", attempt))) }
    })
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        ProvisionError::RetriesExhausted {
            operation,
            attempts,
            last_error,
        } => {
            assert_eq!(operation, "pip install freqtrade");
            assert_eq!(attempts, 3);
            assert!(last_error.contains("attempt 3"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_precondition_is_not_retried() {
    let policy = RetryPolicy::new(5, Duration::ZERO);
    let calls = AtomicU32::new(0);

    let err = retry(&policy, "sudo check", |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(ProvisionError::Precondition("no sudo".to_string())) }
    })
    .await
    .unwrap_err();

    assert!(err.is_precondition());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waits_between_attempts() {
    let policy = RetryPolicy::new(3, Duration::from_secs(5));
    let start = tokio::time::Instant::now();

    let _ = retry(&policy, "apt-get update", |_| async {
        Err::<(), _>(flaky("503"))
    })
    .await;

    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[test]
fn test_policy_needs_at_least_one_attempt() {
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    let default = RetryPolicy::default();
    assert_eq!(default.max_attempts, 3);
    assert_eq!(default.delay, Duration::from_secs(5));
}
