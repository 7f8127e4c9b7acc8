//! Hard per-attempt deadline
//!
//! The guarded future is dropped when the deadline fires, which aborts any
//! socket I/O it was waiting on. Nothing is left armed once `run` returns,
//! whichever way it returns, and any number of timeouts may be active on
//! different tasks at once.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// The guarded call was still running when its deadline elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Killed on timeout ({limit:?})")]
pub struct AttemptTimedOut {
    pub limit: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimeout {
    limit: Duration,
}

impl AttemptTimeout {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Drive `future` to completion or until the deadline, whichever comes
    /// first. A future that resolves to "nothing" (`None`, `()`) still comes
    /// back as `Ok`, so a timeout is never ambiguous.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, AttemptTimedOut>
    where
        F: Future,
    {
        tokio::time::timeout(self.limit, future)
            .await
            .map_err(|_| AttemptTimedOut { limit: self.limit })
    }
}

/// Kill timeout for the next attempt. With a total budget the remaining
/// time, rounded up to whole seconds, can only shrink it.
pub fn effective_kill_timeout(kill: Duration, remaining: Option<Duration>) -> Duration {
    match remaining {
        None => kill,
        Some(remaining) => ceil_secs(remaining).min(kill),
    }
}

fn ceil_secs(duration: Duration) -> Duration {
    let round_up = u64::from(duration.subsec_nanos() > 0);
    Duration::from_secs(duration.as_secs().saturating_add(round_up))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_completes_before_deadline() {
        let guard = AttemptTimeout::new(Duration::from_secs(5));
        let result = guard
            .run(async {
                sleep(Duration::from_secs(1)).await;
                42
            })
            .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_the_deadline() {
        let started = Instant::now();
        let guard = AttemptTimeout::new(Duration::from_secs(2));
        let result = guard.run(sleep(Duration::from_secs(30))).await;

        assert_eq!(
            result,
            Err(AttemptTimedOut {
                limit: Duration::from_secs(2)
            })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_not_a_timeout() {
        let guard = AttemptTimeout::new(Duration::from_secs(1));
        let result: Result<Option<u8>, _> = guard.run(async { None }).await;
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_effective_kill_timeout() {
        let kill = Duration::from_secs(10);
        assert_eq!(effective_kill_timeout(kill, None), kill);
        assert_eq!(
            effective_kill_timeout(kill, Some(Duration::from_millis(100))),
            Duration::from_secs(1)
        );
        assert_eq!(
            effective_kill_timeout(Duration::from_secs(2), Some(Duration::from_millis(2500))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_budget_never_extends_a_fractional_kill_timeout() {
        let kill = Duration::from_millis(1500);
        assert_eq!(effective_kill_timeout(kill, Some(Duration::from_secs(60))), kill);
        assert_eq!(
            effective_kill_timeout(kill, Some(Duration::from_millis(200))),
            Duration::from_secs(1)
        );
        assert_eq!(
            effective_kill_timeout(kill, Some(Duration::from_millis(1200))),
            kill
        );
    }

    #[test]
    fn test_effective_kill_timeout_saturates() {
        assert_eq!(
            effective_kill_timeout(Duration::MAX, Some(Duration::MAX)),
            Duration::from_secs(u64::MAX)
        );
        assert_eq!(
            effective_kill_timeout(Duration::from_secs(7), Some(Duration::MAX)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn test_message() {
        let err = AttemptTimedOut {
            limit: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "Killed on timeout (3s)");
    }
}
