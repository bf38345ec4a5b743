use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Run `op` up to `max_attempts` times (at least once), sleeping `delay`
/// between attempts. Returns the first success, or the last attempt's error
/// unchanged once attempts are exhausted. `op` receives the 1-based attempt
/// number.
pub async fn retry<T, E, F, Fut>(
    operation: &str,
    max_attempts: usize,
    delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                warn!(operation, attempt, max_attempts, error = %e, "Attempt failed, retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn succeeds_on_last_attempt() {
        let calls = AtomicUsize::new(0);
        let result: Result<usize, String> = retry("test", 3, Duration::ZERO, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(format!("boom {attempt}"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_returns_last_error_verbatim() {
        let result: Result<(), String> = retry("test", 2, Duration::ZERO, |attempt| async move {
            Err(format!("boom {attempt}"))
        })
        .await;

        assert_eq!(result, Err("boom 2".to_string()));
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = retry("test", 0, Duration::ZERO, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_attempts() {
        let started = tokio::time::Instant::now();
        let _: Result<(), String> = retry("test", 3, Duration::from_millis(500), |_| async {
            Err("slow".to_string())
        })
        .await;

        assert!(started.elapsed() >= Duration::from_millis(1000));
    }
}
