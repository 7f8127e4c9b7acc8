//! Audit trail of every attempt, successful or not.
//!
//! A [`TrafficRecorder`] is a side-effect sink: it is told about each
//! attempt once it has finished and never influences what happens next.
//! [`RawTrace`] is the recorder that writes the multipart wire dump, with
//! request and response headers passed through an optional
//! [`HeaderFilter`] each.

mod filter;
mod parse;
mod trace;

pub use filter::{HeaderFilter, HeaderRule, MaskAuthorization, MaskByName, MASK_PLACEHOLDER};
pub use parse::{parse_trace, ParsedRequest, ParsedResponse, PartKind, TracePart};
pub use trace::RawTrace;

use crate::types::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Sink for the outcome of each attempt
pub trait TrafficRecorder: Send {
    /// The attempt produced a response (of any status). Redirect hops are
    /// available in `response.history`.
    fn record_success(&mut self, response: &HttpResponse, timing: &Timing);

    /// The attempt produced no response.
    fn record_failure(&mut self, request: &HttpRequest, failure: &FailureNote, timing: &Timing);
}

/// Why an attempt produced no response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureNote {
    /// An error, identified by a short kind name
    Error { kind: String, detail: String },
    /// A free-form reason
    Reason(String),
}

impl FailureNote {
    pub fn error(kind: impl Into<String>, detail: impl ToString) -> Self {
        FailureNote::Error {
            kind: kind.into(),
            detail: detail.to_string(),
        }
    }

    pub fn reason(reason: impl Into<String>) -> Self {
        FailureNote::Reason(reason.into())
    }
}

impl std::fmt::Display for FailureNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureNote::Error { kind, detail } => write!(f, "Exception \"{}\": {}", kind, detail),
            FailureNote::Reason(reason) => f.write_str(reason),
        }
    }
}

/// Wall-clock start plus a monotonic stopwatch
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn stop(&self) -> Timing {
        Timing {
            started_at: self.started_at,
            ended_at: Utc::now(),
            elapsed: self.started.elapsed(),
        }
    }
}

/// When an attempt ran and how long it took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub elapsed: Duration,
}
