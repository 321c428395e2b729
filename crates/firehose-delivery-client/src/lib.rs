//! Firehose delivery client.
//!
//! Sends serializable records to a Firehose-style ingestion stream:
//!
//! - records are encoded as newline-terminated JSON
//! - requests carry at most [`MAX_BATCH_SIZE`] records
//! - transient failures are retried with capped exponential backoff
//! - per-record rejections are reported, never retried
//!
//! Credentials are verified once in [`DeliveryClient::connect`], so a bad
//! token fails fast instead of surfacing as a stream of rejected batches.

mod client;
mod config;
mod error;
mod http_sink;
mod sink;

pub use client::{
    ChunkReport, ChunkState, DeliveryClient, DeliveryOutcome, RecordFailure,
    UNCORRELATED_REJECTION,
};
pub use config::{
    DeliveryConfig, DEFAULT_ENDPOINT, DEFAULT_STREAM_NAME, MAX_BATCH_SIZE, MAX_STREAM_NAME_LEN,
};
pub use error::{DeliveryError, DeliveryResult, SinkError, SinkResult};
pub use http_sink::HttpIngestSink;
pub use sink::{EncodedRecord, IngestSink, PutBatchResponse, RecordResult, SinkIdentity};
