//! Admission control consulted before every attempt

use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Answer of a [`RateLimiter`] check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Allowed,
    /// Not yet; try again after `retry_after`
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Admission-control predicate.
///
/// Implementations are not expected to synchronise anything themselves;
/// callers that share one limiter serialise their checks (see
/// [`SharedRateLimiter`]).
pub trait RateLimiter: Send + fmt::Debug {
    fn check(&mut self) -> Admission;
}

/// One limiter instance reused across strategies, calls or pages
pub type SharedRateLimiter = Arc<Mutex<dyn RateLimiter>>;

pub fn shared<L: RateLimiter + 'static>(limiter: L) -> SharedRateLimiter {
    Arc::new(Mutex::new(limiter))
}

/// Strict pacing with the Generic Cell Rate Algorithm: at most one request
/// per emission interval and no burst credit.
///
/// Times are seconds since the limiter was created, which keeps the
/// floating point values small.
#[derive(Debug)]
pub struct LocalGcra {
    emission_interval: f64,
    tat: Option<f64>,
    epoch: Instant,
}

impl LocalGcra {
    pub fn new(emission_interval: Duration) -> Self {
        Self {
            emission_interval: emission_interval.as_secs_f64(),
            tat: None,
            epoch: Instant::now(),
        }
    }

    /// `count` requests per `period`, evenly spaced
    pub fn per_period(count: NonZeroU32, period: Duration) -> Self {
        Self::new(period / count.get())
    }

    pub fn emission_interval(&self) -> Duration {
        Duration::from_secs_f64(self.emission_interval)
    }

    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

impl RateLimiter for LocalGcra {
    fn check(&mut self) -> Admission {
        let now = self.now();
        let allow_at = self.tat.unwrap_or(now).max(now);
        let diff = now - allow_at;

        if diff < 0.0 {
            let retry_after = (-diff * 100.0).round() / 100.0;
            trace!("Rate limited, retry after {}s", retry_after);
            return Admission::Rejected {
                retry_after: Duration::from_secs_f64(retry_after),
            };
        }

        self.tat = Some(allow_at + self.emission_interval);
        Admission::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn rejected(secs: f64) -> Admission {
        Admission::Rejected {
            retry_after: Duration::from_secs_f64(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing() {
        let mut limiter = LocalGcra::new(Duration::from_secs(6));

        assert_eq!(limiter.check(), Admission::Allowed);
        assert_eq!(limiter.check(), rejected(6.0));

        advance(Duration::from_secs(6)).await;
        assert_eq!(limiter.check(), Admission::Allowed);

        advance(Duration::from_secs(2)).await;
        assert_eq!(limiter.check(), rejected(4.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_leaves_state_alone() {
        let mut limiter = LocalGcra::new(Duration::from_secs(6));
        limiter.check();

        advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.check(), rejected(5.0));
        assert_eq!(limiter.check(), rejected(5.0));

        advance(Duration::from_secs(5)).await;
        assert!(limiter.check().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_burst_after_idle() {
        let mut limiter = LocalGcra::new(Duration::from_secs(1));
        assert!(limiter.check().is_allowed());

        advance(Duration::from_secs(60)).await;
        assert!(limiter.check().is_allowed());
        assert_eq!(limiter.check(), rejected(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_rounded() {
        let mut limiter = LocalGcra::new(Duration::from_micros(1_234_567));
        limiter.check();
        assert_eq!(limiter.check(), rejected(1.23));
    }

    #[test]
    fn test_per_period() {
        let limiter = LocalGcra::per_period(NonZeroU32::new(10).unwrap(), Duration::from_secs(60));
        assert_eq!(limiter.emission_interval(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_instance() {
        let limiter = shared(LocalGcra::new(Duration::from_secs(3)));
        let other = Arc::clone(&limiter);

        assert!(limiter.lock().check().is_allowed());
        assert_eq!(other.lock().check(), rejected(3.0));
    }
}
