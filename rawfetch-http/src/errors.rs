//! HTTP error types

use crate::types::HttpMethodError;

/// Low-level failure of a single transport call
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] HttpMethodError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Exceeded {max} redirects")]
    TooManyRedirects { max: u32 },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Short name of the failure, used when describing it in a trace
    pub fn kind_name(&self) -> &'static str {
        match self {
            TransportError::Network(e) if e.is_timeout() => "Timeout",
            TransportError::Network(e) if e.is_connect() => "ConnectionError",
            TransportError::Network(_) => "NetworkError",
            TransportError::InvalidMethod(_) => "InvalidMethod",
            TransportError::InvalidUrl(_) => "InvalidURL",
            TransportError::InvalidHeader(_) => "InvalidHeader",
            TransportError::TooManyRedirects { .. } => "TooManyRedirects",
            TransportError::Config(_) => "ConfigError",
        }
    }
}

/// Payload did not pass format validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid response: {0}")]
pub struct InvalidResponse(pub String);

/// Failure inside the traffic recorder
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("Masking rule failed for header '{header}': {message}")]
    Mask { header: String, message: String },

    #[error("Malformed trace: {0}")]
    MalformedTrace(String),

    #[error("Failed to write trace: {0}")]
    Io(#[from] std::io::Error),
}
