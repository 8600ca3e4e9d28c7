//! Error types for session registration and execution.
//!
//! All errors raised by the engine are represented by the [`Error`] enum.
//! Errors are:
//! - **Structured**: each variant has named fields
//! - **Comparable**: `Clone + PartialEq`, so a captured error can be stored in
//!   an [`ExecuteActionsResult`](crate::ExecuteActionsResult) and asserted on
//!
//! # Categories
//!
//! | Category | Variants | Raised when |
//! |----------|----------|-------------|
//! | Registration | `InvalidArgument`, `InvalidOperation` | A call is made with bad input or in a bad state |
//! | Configuration | `Configuration` | No executor is registered for a provider |
//! | Dispatch | `Communication`, `Timeout` | The executor call itself failed |
//! | Outcome | `ValidationFailed`, `ExecutionFailed`, `PostProcessing` | The batch ran (or was checked) and failed |
//! | Contract | `ContractViolation` | An executor broke the one-result-per-action rule |
//! | Reconciliation | `Bind` | Returned values could not be written back to an instance |
//! | System | `Codec` | A wire form could not be produced or parsed |

use serde::{Deserialize, Serialize};

/// Engine errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    // ==================== Registration ====================
    /// An argument is missing or malformed
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The operation is not valid in the current state
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    // ==================== Configuration ====================
    /// Executor resolution or configuration loading failed
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    // ==================== Dispatch ====================
    /// The executor could not reach, or lost contact with, its backend
    #[error("communication error: {reason}")]
    Communication { reason: String },

    /// The executor gave up waiting for its backend
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u32, reason: String },

    // ==================== Outcome ====================
    /// The validator chain rejected the batch
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },

    /// The backend reported at least one failed action
    #[error("execution failed: {message}")]
    ExecutionFailed { message: String },

    /// The executor's post-processing step rejected the results
    #[error("post-processing failed: {message}")]
    PostProcessing { message: String },

    // ==================== Contract ====================
    /// Action and result trees do not line up
    #[error("executor contract violation: {reason}")]
    ContractViolation { reason: String },

    // ==================== Reconciliation ====================
    /// A returned value could not be bound onto an instance
    #[error("bind failed for {entity}: {reason}")]
    Bind { entity: String, reason: String },

    // ==================== System ====================
    /// Wire encoding or decoding failed
    #[error("codec error: {reason}")]
    Codec { reason: String },
}

impl Error {
    /// Whether this error came from the executor call itself, leaving backend
    /// state unknown.
    pub fn is_communication(&self) -> bool {
        matches!(self, Error::Communication { .. } | Error::Timeout { .. })
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn contract(reason: impl Into<String>) -> Self {
        Error::ContractViolation {
            reason: reason.into(),
        }
    }
}

impl From<actionflow_core::Error> for Error {
    fn from(e: actionflow_core::Error) -> Self {
        Error::Codec {
            reason: e.to_string(),
        }
    }
}
