//! Error types for the action/result data model
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for data-model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or (de)serializing action and result trees
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading or writing an encoded tree
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// XML could not be produced or parsed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Encoded data is structurally invalid (bad tag, bad version, truncated)
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A value is not acceptable for the field it was supplied for
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Error::SerializationError(e.to_string())
    }
}
