//! Immutable retry strategy and its builder

use rawfetch_http::Timeouts;
use std::fmt;
use std::time::Duration;

use crate::backoff::Backoff;
use crate::classify::StatusPolicy;
use crate::errors::StrategyError;
use crate::rate_limit::SharedRateLimiter;

/// Safety margin added to every rate limiter wait
pub const DEFAULT_RATE_LIMIT_PAD: Duration = Duration::from_millis(50);

/// How a logical request is attempted: timeouts, retry budget, backoff,
/// status policy and an optional rate limiter.
///
/// A `Strategy` is only ever built through [`Strategy::builder`] (or from a
/// [`crate::StrategyConfig`]) and cannot be changed afterwards. Cloning it
/// shares the rate limiter.
#[derive(Clone)]
pub struct Strategy {
    timeouts: Timeouts,
    kill_timeout: Duration,
    max_tries: u32,
    max_total_time: Option<Duration>,
    backoff: Backoff,
    status_policy: StatusPolicy,
    rate_limiter: Option<SharedRateLimiter>,
    rate_limit_pad: Duration,
}

impl Strategy {
    /// Start a strategy with the three mandatory timeouts
    pub fn builder(connect_timeout: Duration, read_timeout: Duration, kill_timeout: Duration) -> StrategyBuilder {
        StrategyBuilder::new(connect_timeout, read_timeout, kill_timeout)
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn connect_timeout(&self) -> Duration {
        self.timeouts.connect
    }

    pub fn read_timeout(&self) -> Duration {
        self.timeouts.read
    }

    /// Hard cap on a single attempt
    pub fn kill_timeout(&self) -> Duration {
        self.kill_timeout
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Wall-clock ceiling across all attempts, sleeps and waits
    pub fn max_total_time(&self) -> Option<Duration> {
        self.max_total_time
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn status_policy(&self) -> &StatusPolicy {
        &self.status_policy
    }

    pub fn rate_limiter(&self) -> Option<&SharedRateLimiter> {
        self.rate_limiter.as_ref()
    }

    pub fn rate_limit_pad(&self) -> Duration {
        self.rate_limit_pad
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("timeouts", &self.timeouts)
            .field("kill_timeout", &self.kill_timeout)
            .field("max_tries", &self.max_tries)
            .field("max_total_time", &self.max_total_time)
            .field("backoff", &self.backoff)
            .field("status_policy", &self.status_policy)
            .field("rate_limiter", &self.rate_limiter.is_some())
            .field("rate_limit_pad", &self.rate_limit_pad)
            .finish()
    }
}

/// Named options for a [`Strategy`]; nothing is checked until [`build`](Self::build)
#[derive(Clone)]
pub struct StrategyBuilder {
    connect_timeout: Duration,
    read_timeout: Duration,
    kill_timeout: Duration,
    max_tries: u32,
    max_total_time: Option<Duration>,
    backoff: Backoff,
    normal_codes: Vec<String>,
    fatal_codes: Vec<String>,
    rate_limiter: Option<SharedRateLimiter>,
    rate_limit_pad: Duration,
}

impl StrategyBuilder {
    pub fn new(connect_timeout: Duration, read_timeout: Duration, kill_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
            kill_timeout,
            max_tries: 1,
            max_total_time: None,
            backoff: Backoff::default(),
            normal_codes: Vec::new(),
            fatal_codes: Vec::new(),
            rate_limiter: None,
            rate_limit_pad: DEFAULT_RATE_LIMIT_PAD,
        }
    }

    pub fn max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn max_total_time(mut self, max_total_time: Duration) -> Self {
        self.max_total_time = Some(max_total_time);
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff.multiplier = multiplier;
        self
    }

    pub fn backoff_exponent(mut self, exponent: f64) -> Self {
        self.backoff.exponent = exponent;
        self
    }

    /// 4xx/5xx codes to hand back as ordinary responses
    pub fn normal_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.normal_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Codes or `DDx`/`Dxx` patterns that end the request without retrying
    pub fn fatal_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.fatal_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn rate_limiter(mut self, limiter: SharedRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn rate_limit_pad(mut self, pad: Duration) -> Self {
        self.rate_limit_pad = pad;
        self
    }

    pub fn build(self) -> Result<Strategy, StrategyError> {
        if self.max_tries == 0 {
            return Err(StrategyError::option("max_tries", "must be at least 1"));
        }
        if self.connect_timeout.is_zero() {
            return Err(StrategyError::option("connect_timeout", "must be greater than zero"));
        }
        if self.read_timeout.is_zero() {
            return Err(StrategyError::option("read_timeout", "must be greater than zero"));
        }
        if self.kill_timeout.is_zero() {
            return Err(StrategyError::option("kill_timeout", "must be greater than zero"));
        }
        if self.max_total_time.is_some_and(|total| total.is_zero()) {
            return Err(StrategyError::option("max_total_time", "must be greater than zero"));
        }
        let Backoff { multiplier, exponent } = self.backoff;
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(StrategyError::option(
                "backoff_multiplier",
                format!("must be a finite number >= 0, got {}", multiplier),
            ));
        }
        if !exponent.is_finite() || exponent <= 0.0 {
            return Err(StrategyError::option(
                "backoff_exponent",
                format!("must be a finite number > 0, got {}", exponent),
            ));
        }

        let status_policy = StatusPolicy::new(self.normal_codes, self.fatal_codes)?;

        Ok(Strategy {
            timeouts: Timeouts::new(self.connect_timeout, self.read_timeout),
            kill_timeout: self.kill_timeout,
            max_tries: self.max_tries,
            max_total_time: self.max_total_time,
            backoff: self.backoff,
            status_policy,
            rate_limiter: self.rate_limiter,
            rate_limit_pad: self.rate_limit_pad,
        })
    }
}
