//! Custom error types for the bench.
//!
//! This module defines the primary error type, `BenchError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur while driving the radio tester and the
//! DC source.
//!
//! ## Error Hierarchy
//!
//! - **`Transport`**: Wraps `anyhow::Error` raised by a [`CommandChannel`](crate::adapters::CommandChannel)
//!   adapter (connection refused, VISA I/O failure). Never recovered locally.
//! - **`PollTimeout`**: A completion or state poll did not see its expected reply before the
//!   poll deadline elapsed. Only produced when the [`PollPolicy`](crate::sync::PollPolicy)
//!   carries a deadline.
//! - **`UnknownCode`**: An enumerated instrument code (GSM band, LTE bandwidth, paging cycle)
//!   was requested that has no entry in its lookup table. Raised before any command is sent.
//! - **`ReplySchema`** / **`ParseReply`**: A reply did not match the shape its schema expects.
//! - **`Config`** / **`Configuration`**: Loading or validating the bench configuration failed.
//!
//! Measurement invalidity is deliberately *not* an error: it is carried as a sentinel value in
//! [`ResultRecord`](crate::records::ResultRecord) so that recording always succeeds.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, BenchError>;

/// Errors raised by the bench.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Transport error: {0:#}")]
    Transport(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {waited:?} polling '{query}' (last reply: {last_reply:?})")]
    PollTimeout {
        query: String,
        waited: Duration,
        last_reply: Option<String>,
    },

    #[error("Unknown {kind} '{value}'")]
    UnknownCode { kind: &'static str, value: String },

    #[error("Reply for {schema} has {actual} fields, expected at least {expected}: '{reply}'")]
    ReplySchema {
        schema: &'static str,
        expected: usize,
        actual: usize,
        reply: String,
    },

    #[error("Failed to parse reply: {0}")]
    ParseReply(String),

    #[error("Signal routing must be set before a RAT controller is created")]
    RouteNotSet,

    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Requested {requested:.1} V exceeds the protection limit of {limit:.1} V")]
    OverVoltage { requested: f64, limit: f64 },

    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for BenchError {
    fn from(err: figment::Error) -> Self {
        BenchError::Config(Box::new(err))
    }
}
