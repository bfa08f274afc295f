/*
[INPUT]:  Error sources (runtime lookup, configuration parsing, file IO)
[OUTPUT]: Structured error type for holder setup and launch
[POS]:    Error handling layer - unified error types for the crate
[UPDATE]: When adding new error sources
*/

use thiserror::Error;

/// Errors raised by the holder itself.
///
/// Operation failures never show up here; they are mapped into the holder's
/// declared error type and surface through its snapshot.
#[derive(Error, Debug)]
pub enum HolderError {
    /// No Tokio runtime was configured and none is entered on this thread
    #[error("No Tokio runtime available to launch the operation")]
    NoRuntime,

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HolderError {
    /// Check if the error comes from the missing runtime rather than bad input
    pub fn is_runtime_error(&self) -> bool {
        matches!(self, HolderError::NoRuntime)
    }
}

/// Result type alias for holder operations
pub type Result<T> = std::result::Result<T, HolderError>;
