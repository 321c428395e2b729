//! Validation errors raised while classifying or expanding a run document.

use thiserror::Error;

/// Reasons a source document cannot be expanded.
///
/// All variants are fatal to the single document being expanded and are
/// never retried.
#[derive(Error, Debug)]
pub enum ExpandError {
    /// The document is not a JSON object.
    #[error("Document is not a JSON object")]
    NotAnObject,

    /// The run identifier (`event_id` / `run_id`) is missing or blank.
    #[error("Document is missing its run identifier")]
    MissingRunId,

    /// A run-level field has the wrong type.
    #[error("Malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `steps` or `api_calls` is present but unusable.
    #[error("Invalid `{field}` sequence: {reason}")]
    InvalidSequence { field: &'static str, reason: String },

    /// A timestamp field could not be parsed.
    #[error("Invalid timestamp in `{field}`: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// Result type alias using ExpandError.
pub type ExpandResult<T> = Result<T, ExpandError>;
