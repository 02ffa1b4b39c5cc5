//! Bounded retry for remote operations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Run `op` up to `max_attempts` times, sleeping `delay` between failures.
/// Returns the first success, or `None` once the budget is exhausted. No
/// sleep follows the final attempt.
pub async fn attempt<T, E, F, Fut>(
    label: &str,
    max_attempts: u32,
    delay: Duration,
    mut op: F,
) -> Option<T>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    for n in 1..=max_attempts {
        match op().await {
            Ok(value) => return Some(value),
            Err(e) => warn!(attempt = n, max_attempts, error = %e, "{label} attempt failed"),
        }
        if n < max_attempts {
            tokio::time::sleep(delay).await;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn first_success_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = attempt("op", 5, Duration::ZERO, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(42)
            }
        })
        .await;
        assert_eq!(result, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = attempt("op", 5, Duration::ZERO, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err("not yet")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_none() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Option<u32> = attempt("op", 3, Duration::ZERO, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>("still broken")
            }
        })
        .await;
        assert_eq!(result, None);
        // Exactly the budget, no more.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_budget_never_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Option<u32> = attempt("op", 0, Duration::ZERO, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>("unreachable")
            }
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
