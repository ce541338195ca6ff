//! Error types for the proctor lockdown core

use thiserror::Error;

/// Result type alias for lockdown operations
pub type LockdownResult<T> = Result<T, LockdownError>;

/// Failures reported by the page environment through the host seams.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The browser refused the request (e.g. fullscreen outside a user gesture).
    #[error("request rejected by the browser: {0}")]
    Rejected(String),

    /// No element matched the configured submission selector.
    #[error("no element matches selector {0}")]
    TargetMissing(String),

    /// The host side is gone (page unloaded, bridge closed).
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur in the lockdown core
#[derive(Error, Debug)]
pub enum LockdownError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Submission target {selector} not found; tripped exam was not submitted")]
    SubmissionTargetMissing { selector: String },

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<config::ConfigError> for LockdownError {
    fn from(err: config::ConfigError) -> Self {
        LockdownError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LockdownError {
    fn from(err: serde_json::Error) -> Self {
        LockdownError::Protocol(err.to_string())
    }
}
