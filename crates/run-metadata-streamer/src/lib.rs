//! Run metadata streamer.
//!
//! Turns stored research run documents into `run`, `step` and `call`
//! records and delivers them to the ingestion stream. Every operation is
//! sequential: one document, one chunk at a time.
//!
//! ```ignore
//! let store = RunDocumentStore::open(&path).await?;
//! let client = DeliveryClient::connect_http(config).await?;
//! let streamer = MetadataStreamer::new(store, client);
//!
//! let summary = streamer.backfill(50).await?;
//! ```

mod error;
mod streamer;

pub use error::{StreamerError, StreamerResult};
pub use streamer::{BackfillSummary, MetadataStreamer, DEFAULT_SINCE_LIMIT};
