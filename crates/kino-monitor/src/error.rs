//! Error types for Kino Monitor

use thiserror::Error;

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Telemetry error types
#[derive(Error, Debug)]
pub enum Error {
    // Lifecycle errors
    #[error("Invalid tracker state for {operation}: tracker is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    // Metadata errors
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    // Delivery errors
    #[error("Delivery failed via {dispatcher}: {message}")]
    Delivery { dispatcher: String, message: String },

    #[error("Delivery queue rejected {records} records")]
    HandoffRejected { records: usize },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a delivery error
    pub fn delivery(dispatcher: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Delivery {
            dispatcher: dispatcher.into(),
            message: message.into(),
        }
    }

    /// Returns true if retrying the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Delivery { .. } | Error::HandoffRejected { .. })
    }

    /// Returns the error code for diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidState { .. } => "INVALID_STATE",
            Error::MalformedMetadata(_) => "MALFORMED_METADATA",
            Error::Delivery { .. } => "DELIVERY",
            Error::HandoffRejected { .. } => "HANDOFF_REJECTED",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Io(_) => "IO",
        }
    }
}
