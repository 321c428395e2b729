//! Read side of the run document store, as seen by the streamer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::StoreResult;

/// A queryable source of raw run documents.
///
/// Documents are returned untouched; validation belongs to the expander.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Up to `limit` documents, newest first.
    async fn fetch_recent(&self, limit: usize) -> StoreResult<Vec<Value>>;

    /// The document whose run identifier equals `run_id`.
    async fn fetch_by_id(&self, run_id: &str) -> StoreResult<Option<Value>>;

    /// Up to `limit` documents with `start <= timestamp <= end`, oldest first.
    async fn fetch_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Value>>;
}

#[async_trait]
impl<S: SourceStore + ?Sized> SourceStore for Arc<S> {
    async fn fetch_recent(&self, limit: usize) -> StoreResult<Vec<Value>> {
        (**self).fetch_recent(limit).await
    }

    async fn fetch_by_id(&self, run_id: &str) -> StoreResult<Option<Value>> {
        (**self).fetch_by_id(run_id).await
    }

    async fn fetch_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Value>> {
        (**self).fetch_range(start, end, limit).await
    }
}
