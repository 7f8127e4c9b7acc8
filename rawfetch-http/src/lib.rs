//! HTTP transport for rawfetch
//!
//! This crate provides the request/response value types, the `Transport`
//! seam the resilience engine calls through (with a reqwest implementation),
//! raw traffic recording with header masking, and payload validators.

pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod types;

#[cfg(feature = "recording")]
pub mod recording;

// Re-export main types for convenience
pub use client::{ReqwestTransport, Transport};
pub use config::HttpConfig;
pub use errors::{InvalidResponse, RecordingError, TransportError};
pub use types::{encode_query, HttpMethod, HttpMethodError, HttpRequest, HttpResponse, Timeouts};

#[cfg(feature = "recording")]
pub use recording::{FailureNote, HeaderFilter, RawTrace, Timer, Timing, TrafficRecorder};
