//! Resilience engine for rawfetch
//!
//! This crate wraps a raw HTTP [`Transport`](rawfetch_http::Transport) with
//! bounded retries and exponential backoff under a total time budget, GCRA
//! admission control, a hard per-attempt timeout, and status-code
//! classification. Every attempt can be handed to a
//! [`TrafficRecorder`](rawfetch_http::TrafficRecorder).

pub mod backoff;
pub mod classify;
pub mod config;
pub mod engine;
pub mod errors;
pub mod pagination;
pub mod rate_limit;
pub mod strategy;
pub mod timeout;

// Re-export commonly used types
pub use backoff::Backoff;
pub use classify::{StatusPolicy, Verdict};
pub use config::{RateLimitConfig, StrategyConfig};
pub use engine::{Attempt, ResilientClient};
pub use errors::{AttemptFailure, BudgetStage, FetchError, FetchErrorKind, StrategyError};
pub use pagination::{LinkPaginator, PaginatedFetch, Paginator};
pub use rate_limit::{shared, Admission, LocalGcra, RateLimiter, SharedRateLimiter};
pub use strategy::{Strategy, StrategyBuilder, DEFAULT_RATE_LIMIT_PAD};
pub use timeout::{effective_kill_timeout, AttemptTimedOut, AttemptTimeout};
