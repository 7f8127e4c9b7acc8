//! Exponential backoff between attempts

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `multiplier × exponent^n` seconds, where `n` is the number of attempts
/// already made.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    pub multiplier: f64,
    pub exponent: f64,
}

impl Default for Backoff {
    /// With these values the pauses run 1s, 2s, 4s, 8s, ...
    fn default() -> Self {
        Self {
            multiplier: 0.5,
            exponent: 2.0,
        }
    }
}

impl Backoff {
    pub fn new(multiplier: f64, exponent: f64) -> Self {
        Self {
            multiplier,
            exponent,
        }
    }

    /// Pause before the next attempt. Nothing precedes the first attempt,
    /// so `attempts_made == 0` is zero rather than `multiplier × 1`.
    pub fn delay_before(&self, attempts_made: u32) -> Duration {
        if attempts_made == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempts_made).unwrap_or(i32::MAX);
        let seconds = self.multiplier * self.exponent.powi(exponent);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_before(0), Duration::ZERO);
        assert_eq!(backoff.delay_before(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_before(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_before(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_before(4), Duration::from_secs(8));
    }

    #[test]
    fn test_custom_schedule() {
        let backoff = Backoff::new(0.1, 3.0);
        assert_eq!(backoff.delay_before(1).as_millis(), 300);
        assert_eq!(backoff.delay_before(2).as_millis(), 900);
    }

    #[test]
    fn test_zero_multiplier_never_waits() {
        let backoff = Backoff::new(0.0, 2.0);
        assert_eq!(backoff.delay_before(5), Duration::ZERO);
    }

    #[test]
    fn test_huge_exponent_saturates() {
        let backoff = Backoff::new(1.0, 10.0);
        assert_eq!(backoff.delay_before(400), Duration::MAX);
    }
}
