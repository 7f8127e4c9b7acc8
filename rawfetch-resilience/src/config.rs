//! Serde form of a [`Strategy`]

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::StrategyError;
use crate::rate_limit::{shared, LocalGcra};
use crate::strategy::{Strategy, DEFAULT_RATE_LIMIT_PAD};

/// Strategy options as they appear in a configuration file.
///
/// Durations use humantime notation (`"1500ms"`, `"2s"`, `"1m"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Hard cap on a single attempt
    #[serde(with = "humantime_serde")]
    pub kill_timeout: Duration,

    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    #[serde(default, with = "humantime_serde")]
    pub max_total_time: Option<Duration>,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_backoff_exponent")]
    pub backoff_exponent: f64,

    #[serde(default)]
    pub normal_codes: Vec<String>,

    #[serde(default)]
    pub fatal_codes: Vec<String>,

    /// A fresh limiter is created for every strategy built from this config
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(default = "default_rate_limit_pad", with = "humantime_serde")]
    pub rate_limit_pad: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Minimum spacing between admitted requests
    #[serde(with = "humantime_serde")]
    pub emission_interval: Duration,
}

fn default_max_tries() -> u32 {
    1
}

fn default_backoff_multiplier() -> f64 {
    0.5
}

fn default_backoff_exponent() -> f64 {
    2.0
}

fn default_rate_limit_pad() -> Duration {
    DEFAULT_RATE_LIMIT_PAD
}

impl StrategyConfig {
    pub fn new(connect_timeout: Duration, read_timeout: Duration, kill_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
            kill_timeout,
            max_tries: default_max_tries(),
            max_total_time: None,
            backoff_multiplier: default_backoff_multiplier(),
            backoff_exponent: default_backoff_exponent(),
            normal_codes: Vec::new(),
            fatal_codes: Vec::new(),
            rate_limit: None,
            rate_limit_pad: default_rate_limit_pad(),
        }
    }

    pub fn build(self) -> Result<Strategy, StrategyError> {
        let mut builder = Strategy::builder(self.connect_timeout, self.read_timeout, self.kill_timeout)
            .max_tries(self.max_tries)
            .backoff_multiplier(self.backoff_multiplier)
            .backoff_exponent(self.backoff_exponent)
            .normal_codes(self.normal_codes)
            .fatal_codes(self.fatal_codes)
            .rate_limit_pad(self.rate_limit_pad);

        if let Some(total) = self.max_total_time {
            builder = builder.max_total_time(total);
        }
        if let Some(rate_limit) = self.rate_limit {
            if rate_limit.emission_interval.is_zero() {
                return Err(StrategyError::option(
                    "rate_limit.emission_interval",
                    "must be greater than zero",
                ));
            }
            builder = builder.rate_limiter(shared(LocalGcra::new(rate_limit.emission_interval)));
        }

        builder.build()
    }
}

impl TryFrom<StrategyConfig> for Strategy {
    type Error = StrategyError;

    fn try_from(config: StrategyConfig) -> Result<Self, Self::Error> {
        config.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Verdict;

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
connect_timeout: 3s
read_timeout: 10s
kill_timeout: 15s
max_tries: 4
max_total_time: 1m
backoff_multiplier: 0.25
normal_codes: ["404"]
fatal_codes: ["401", "5xx"]
rate_limit:
  emission_interval: 1500ms
"#;
        let config: StrategyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_total_time, Some(Duration::from_secs(60)));
        assert_eq!(config.backoff_exponent, 2.0);
        assert_eq!(config.rate_limit_pad, Duration::from_millis(50));
        assert_eq!(
            config.rate_limit.as_ref().map(|r| r.emission_interval),
            Some(Duration::from_millis(1500))
        );

        let strategy = Strategy::try_from(config).unwrap();
        assert_eq!(strategy.max_tries(), 4);
        assert_eq!(strategy.kill_timeout(), Duration::from_secs(15));
        assert_eq!(strategy.status_policy().classify_status(404), Verdict::Success);
        assert_eq!(strategy.status_policy().classify_status(401), Verdict::Fatal);
        assert_eq!(strategy.status_policy().classify_status(429), Verdict::Retry);
        assert!(strategy.rate_limiter().is_some());
    }

    #[test]
    fn test_minimal_json_config_uses_defaults() {
        let json = r#"{"connect_timeout": "1s", "read_timeout": "2s", "kill_timeout": "5s"}"#;
        let config: StrategyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            StrategyConfig::new(Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(5))
        );

        let strategy = config.build().unwrap();
        assert_eq!(strategy.max_tries(), 1);
        assert_eq!(strategy.max_total_time(), None);
        assert!(strategy.rate_limiter().is_none());
    }

    #[test]
    fn test_round_trip_through_yaml() {
        let mut config = StrategyConfig::new(
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(5),
        );
        config.max_total_time = Some(Duration::from_millis(2500));
        config.fatal_codes = vec!["5xx".to_string()];

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: StrategyConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = StrategyConfig::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        config.fatal_codes = vec!["2xx".to_string()];
        assert_eq!(
            config.clone().build().unwrap_err(),
            StrategyError::InvalidFatalCode("2xx".to_string())
        );

        config.fatal_codes.clear();
        config.rate_limit = Some(RateLimitConfig {
            emission_interval: Duration::ZERO,
        });
        assert!(matches!(
            config.build(),
            Err(StrategyError::InvalidOption {
                field: "rate_limit.emission_interval",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let yaml = "connect_timeout: 1s\nread_timeout: 1s\nkill_timeout: 1s\nretries: 3\n";
        assert!(serde_yaml::from_str::<StrategyConfig>(yaml).is_err());
    }
}
