//! Error types for the ntuple projection core.
//!
//! Only a handful of conditions are real errors here: projection itself
//! degrades to sentinel values for everything except exhaustion of a
//! fixed-capacity flat store, which would otherwise corrupt index ranges.

use thiserror::Error;

use crate::layout::ChildKind;

/// Result type alias for ntuplizer operations.
pub type Result<T> = std::result::Result<T, NtupleError>;

/// Main error type for ntuplizer operations.
#[derive(Error, Debug, Clone)]
pub enum NtupleError {
    /// A fixed-capacity flat array overflowed (fatal for the run)
    #[error("Capacity exceeded for {kind}: more than {capacity} entries in one event")]
    CapacityExceeded { kind: ChildKind, capacity: usize },

    /// A configured trigger pattern is not a valid glob
    #[error("Invalid trigger pattern '{pattern}': {reason}")]
    InvalidTriggerPattern { pattern: String, reason: String },

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input record could not be decoded
    #[error("Malformed input at record {record}: {reason}")]
    MalformedInput { record: u64, reason: String },

    /// I/O failure while reading events or writing records
    #[error("IO error: {0}")]
    Io(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

impl NtupleError {
    /// Create a generic error from any string-like type.
    pub fn generic(msg: impl Into<String>) -> Self {
        NtupleError::Generic(msg.into())
    }

    /// Whether this error must abort the whole run rather than a single event.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NtupleError::CapacityExceeded { .. })
    }
}

impl From<std::io::Error> for NtupleError {
    fn from(err: std::io::Error) -> Self {
        NtupleError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NtupleError {
    fn from(err: serde_json::Error) -> Self {
        NtupleError::Json(err.to_string())
    }
}

impl From<String> for NtupleError {
    fn from(err: String) -> Self {
        NtupleError::Generic(err)
    }
}

impl From<&str> for NtupleError {
    fn from(err: &str) -> Self {
        NtupleError::Generic(err.to_string())
    }
}
