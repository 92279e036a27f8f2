//! Failure kinds surfaced by the import and aggregate paths.
//!
//! Nothing in the core retries; each failure goes straight back to the caller,
//! which maps `code()` onto its own response envelope.

use crate::ids::NumericId;
use crate::xml::XmlError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The submitted batch could not be turned into records.
    #[error("malformed input: {0}")]
    MalformedInput(#[from] XmlError),

    /// Any store failure. For imports the whole batch has been rolled back.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] rusqlite::Error),

    #[error("Test not found")]
    TestNotFound(NumericId),

    #[error("No results found")]
    NoResultsFound(NumericId),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::MalformedInput(XmlError::Syntax(_)) => "xml_parse_failed",
            ServiceError::MalformedInput(_) => "malformed_input",
            ServiceError::StorageFailure(_) => "storage_failure",
            ServiceError::TestNotFound(_) => "test_not_found",
            ServiceError::NoResultsFound(_) => "no_results",
        }
    }
}
