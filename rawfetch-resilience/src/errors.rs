//! Error types for the resilience engine

use rawfetch_http::{FailureNote, HttpResponse, InvalidResponse, TransportError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::timeout::AttemptTimedOut;

/// Why a single attempt did not produce an acceptable response. Every
/// variant is retried; after the last try the final one is reported in
/// [`FetchError::RetriesExhausted`].
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Timeout(#[from] AttemptTimedOut),

    #[error("HTTP status {status} is retryable")]
    RetryableStatus { status: u16 },
}

impl AttemptFailure {
    /// Short kind name, as written into the traffic dump
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttemptFailure::Transport(e) => e.kind_name(),
            AttemptFailure::Timeout(_) => "AttemptTimeout",
            AttemptFailure::RetryableStatus { .. } => "RetryableStatus",
        }
    }

    /// How the failure is recorded when no response came back
    pub fn note(&self) -> FailureNote {
        FailureNote::error(self.kind_name(), self)
    }
}

/// Point in the retry loop at which the total budget ran out
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetStage {
    /// Nothing left before the next attempt could start
    BeforeAttempt,
    /// The backoff pause would end past the deadline
    Backoff { pause: Duration },
    /// The rate limiter wait (plus pad) would end past the deadline
    RateLimit { retry_after: Duration },
}

impl fmt::Display for BudgetStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetStage::BeforeAttempt => f.write_str("reached"),
            BudgetStage::Backoff { pause } => write!(
                f,
                "would get reached after exponential backoff of {:?}",
                pause
            ),
            BudgetStage::RateLimit { retry_after } => write!(
                f,
                "would get reached after rate limiter Retry-After value of {:?}",
                retry_after
            ),
        }
    }
}

/// Terminal outcome of a logical request
#[derive(Debug, Error)]
pub enum FetchError {
    /// The configured total time would be exceeded
    #[error("Total timeout of {budget:?} {stage}")]
    BudgetExhausted { budget: Duration, stage: BudgetStage },

    /// Every try was used up without success or a fatal status
    #[error("Request failed (total: {tries} tries)")]
    RetriesExhausted {
        tries: u32,
        #[source]
        last_failure: Option<AttemptFailure>,
    },

    /// The status matched a fatal pattern; the response is kept for the caller
    #[error("HTTP error {status} for url {url}")]
    FatalStatus {
        status: u16,
        url: String,
        response: Box<HttpResponse>,
    },

    #[error(transparent)]
    InvalidResponse(#[from] InvalidResponse),

    #[error("Pagination error: {0}")]
    Pagination(String),
}

/// Discriminant of [`FetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    BudgetExhausted,
    RetriesExhausted,
    FatalStatus,
    InvalidResponse,
    Pagination,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::BudgetExhausted { .. } => FetchErrorKind::BudgetExhausted,
            FetchError::RetriesExhausted { .. } => FetchErrorKind::RetriesExhausted,
            FetchError::FatalStatus { .. } => FetchErrorKind::FatalStatus,
            FetchError::InvalidResponse(_) => FetchErrorKind::InvalidResponse,
            FetchError::Pagination(_) => FetchErrorKind::Pagination,
        }
    }

    /// The response behind a fatal status, if any
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            FetchError::FatalStatus { response, .. } => Some(response.as_ref()),
            _ => None,
        }
    }

    /// Why the final try failed, once every try was used up
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        match self {
            FetchError::RetriesExhausted { last_failure, .. } => last_failure.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn fatal_status(response: HttpResponse) -> Self {
        FetchError::FatalStatus {
            status: response.status,
            url: response.url.clone(),
            response: Box::new(response),
        }
    }
}

/// Construction-time validation failure of a [`crate::Strategy`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("Invalid normal response code \"{0}\": expected a 3-digit code between 400 and 599")]
    InvalidNormalCode(String),

    #[error("Invalid fatal response code \"{0}\": expected a 4xx/5xx code or a pattern such as 50x or 5xx")]
    InvalidFatalCode(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidOption {
        field: &'static str,
        message: String,
    },
}

impl StrategyError {
    pub(crate) fn option(field: &'static str, message: impl Into<String>) -> Self {
        StrategyError::InvalidOption {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawfetch_http::HttpRequest;

    #[test]
    fn test_messages() {
        let err = FetchError::RetriesExhausted {
            tries: 3,
            last_failure: None,
        };
        assert_eq!(err.to_string(), "Request failed (total: 3 tries)");

        let err = FetchError::BudgetExhausted {
            budget: Duration::from_secs(2),
            stage: BudgetStage::BeforeAttempt,
        };
        assert_eq!(err.to_string(), "Total timeout of 2s reached");

        let err = FetchError::BudgetExhausted {
            budget: Duration::from_secs(2),
            stage: BudgetStage::RateLimit {
                retry_after: Duration::from_millis(6050),
            },
        };
        assert_eq!(
            err.to_string(),
            "Total timeout of 2s would get reached after rate limiter Retry-After value of 6.05s"
        );
    }

    #[test]
    fn test_kinds_are_distinguishable() {
        let response = HttpResponse::new(HttpRequest::get("http://example.com/x"), 500);
        let fatal = FetchError::fatal_status(response);
        assert_eq!(fatal.kind(), FetchErrorKind::FatalStatus);
        assert_eq!(fatal.response().map(|r| r.status), Some(500));
        assert_eq!(fatal.to_string(), "HTTP error 500 for url http://example.com/x");

        let exhausted = FetchError::RetriesExhausted {
            tries: 1,
            last_failure: Some(AttemptFailure::RetryableStatus { status: 503 }),
        };
        assert_eq!(exhausted.kind(), FetchErrorKind::RetriesExhausted);
        assert!(exhausted.response().is_none());
        assert!(std::error::Error::source(&exhausted).is_some());
    }

    #[test]
    fn test_last_failure_is_the_source() {
        let err = FetchError::RetriesExhausted {
            tries: 2,
            last_failure: Some(TransportError::InvalidUrl("x".into()).into()),
        };
        assert!(matches!(err.last_failure(), Some(AttemptFailure::Transport(_))));
        let source = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("Invalid URL: x"));

        let err = FetchError::Pagination("stuck".into());
        assert!(err.last_failure().is_none());
    }

    #[test]
    fn test_attempt_failure_note() {
        let failure = AttemptFailure::Timeout(AttemptTimedOut {
            limit: Duration::from_secs(3),
        });
        assert_eq!(
            failure.note().to_string(),
            "Exception \"AttemptTimeout\": Killed on timeout (3s)"
        );
    }
}
