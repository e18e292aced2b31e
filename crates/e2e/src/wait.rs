//! Bounded, condition-based waiting
//!
//! Nothing in the harness sleeps for a fixed time to let the server catch up.
//! Every wait polls a check until it yields a value or the deadline passes.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bounds for the different kinds of waits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timeouts {
    /// Success/error banner after a submit
    pub banner_ms: u64,
    /// Redirect following a successful action
    pub navigation_ms: u64,
    /// Element visibility and text checks
    pub element_ms: u64,
    /// History table refresh after a calculation
    pub table_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            banner_ms: 5_000,
            navigation_ms: 10_000,
            element_ms: 5_000,
            table_ms: 5_000,
        }
    }
}

impl Timeouts {
    pub fn banner(&self) -> Duration {
        Duration::from_millis(self.banner_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn table(&self) -> Duration {
        Duration::from_millis(self.table_ms)
    }
}

/// Poll `check` until it returns `Some`, failing with `TimeoutExceeded` once
/// `timeout` has elapsed. The check always runs at least once. Check errors
/// abort the wait immediately.
pub async fn poll_until<T, F, Fut>(what: &str, timeout: Duration, mut check: F) -> E2eResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = check().await? {
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            debug!("Gave up waiting for {} after {} checks", what, attempts);
            return Err(E2eError::timeout(what, timeout));
        }

        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_returns_first_value() {
        let value = poll_until("ready", Duration::from_millis(50), || async {
            Ok(Some(7))
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_polls_until_condition_holds() {
        let calls = AtomicU32::new(0);
        let value = poll_until("third check", Duration::from_secs(2), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok((n >= 3).then_some(n)) }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_times_out() {
        let start = std::time::Instant::now();
        let err = poll_until::<(), _, _>("never", Duration::from_millis(150), || async {
            Ok(None)
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("never"));
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_zero_timeout_checks_once() {
        let calls = AtomicU32::new(0);
        let result = poll_until::<(), _, _>("once", Duration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_check_error_aborts() {
        let err = poll_until::<(), _, _>("broken", Duration::from_secs(5), || async {
            Err(E2eError::Bridge("context closed".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, E2eError::Bridge(_)));
    }
}
