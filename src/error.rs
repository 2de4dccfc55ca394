//! # Conformance Error Types
//!
//! Unified error handling for adapters, fixtures, filters and the scenario
//! orchestrator.
//!
//! Assertion mismatches are *not* errors: they are recorded as
//! [`AssertionRecord`](crate::scenario::AssertionRecord)s and never abort a
//! scenario. Everything here either aborts the current scenario (transport,
//! fixture, protocol problems) or is surfaced straight to the caller (filter
//! parse errors).

use thiserror::Error;

use crate::filter::FilterParseError;
use crate::transport::StatusClass;

/// Conformance operation result type
pub type ConformanceResult<T> = Result<T, ConformanceError>;

/// Error taxonomy for the conformance engine
#[derive(Debug, Error)]
pub enum ConformanceError {
    #[error("Transport error talking to {transport}: {reason}")]
    Transport { transport: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fixture construction failed: {0}")]
    Fixture(String),

    #[error("Filter parse error: {0}")]
    Parse(#[from] FilterParseError),

    #[error("Invalid response: {field} - {reason}")]
    InvalidResponse { field: String, reason: String },

    #[error("Unexpected status {status} for {operation}")]
    UnexpectedStatus {
        operation: String,
        status: StatusClass,
    },

    #[error("Timeout waiting for operation: {operation}")]
    Timeout { operation: String },

    #[error("Step '{step}' failed; remaining steps skipped")]
    ChainBroken { step: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConformanceError {
    /// Create a transport error for the named transport
    pub fn transport(transport: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            transport: transport.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a fixture construction error
    pub fn fixture(message: impl Into<String>) -> Self {
        Self::Fixture(message.into())
    }

    /// Create an invalid response error for protocol violations
    ///
    /// Use this when a response claims success but is missing required
    /// fields or carries malformed data. Such responses are not defaulted.
    pub fn invalid_response(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unexpected status error
    pub fn unexpected_status(operation: impl Into<String>, status: StatusClass) -> Self {
        Self::UnexpectedStatus {
            operation: operation.into(),
            status,
        }
    }

    /// Network or protocol-level failure talking to the service
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ConformanceError::Transport { .. }
                | ConformanceError::Http(_)
                | ConformanceError::Timeout { .. }
        )
    }

    /// An asserted business-logic failure that stopped the scenario early.
    ///
    /// Scenarios ending with this error are FAILED, not ERRORED: the failing
    /// assertion has already been recorded.
    #[must_use]
    pub fn is_assertion_failure(&self) -> bool {
        matches!(self, ConformanceError::ChainBroken { .. })
    }
}
