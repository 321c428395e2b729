//! Run document store.
//!
//! Research runs are persisted as raw JSON documents, one row per run id,
//! ordered by the run's own timestamp. The streamer reads them through the
//! [`SourceStore`] trait; the CLI writes them with [`RunDocumentStore::save`].

mod error;
mod migrations;
mod source;
mod store;

pub use error::{StoreError, StoreResult};
pub use migrations::CURRENT_VERSION as SCHEMA_VERSION;
pub use source::SourceStore;
pub use store::RunDocumentStore;
