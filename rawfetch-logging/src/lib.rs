//! Logging setup for rawfetch
//!
//! The libraries only emit `tracing` events; applications and tests pick a
//! subscriber here, either from a [`LoggingConfig`] or from a plain filter
//! directive.

pub mod config;
pub mod init;

// Re-export main types for convenience
pub use config::{ConfigError, LogFormat, LogLevel, LoggingConfig};
pub use init::{init_logging_from_config, init_simple_tracing};
