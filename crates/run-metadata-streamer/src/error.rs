//! Streamer error types.

use firehose_delivery_client::DeliveryError;
use run_document_store::StoreError;
use run_record_expander::ExpandError;
use thiserror::Error;

/// Errors surfaced to the caller of a streaming operation.
#[derive(Error, Debug)]
pub enum StreamerError {
    /// The document failed validation.
    #[error("Invalid run document: {0}")]
    Expand(#[from] ExpandError),

    /// Delivery raised (credentials or sink unreachable).
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// The source store could not be read.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No document with this run id exists.
    #[error("Run not found: {0}")]
    NotFound(String),
}

/// Result type alias using StreamerError.
pub type StreamerResult<T> = Result<T, StreamerError>;
