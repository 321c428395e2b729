//! Expand-and-deliver loop over stored run documents.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use firehose_delivery_client::{DeliveryClient, DeliveryError, DeliveryOutcome, IngestSink};
use run_document_store::SourceStore;
use run_record_expander::{Clock, RecordExpander, SystemClock};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{StreamerError, StreamerResult};

/// Most documents `stream_since` will replay in one call.
pub const DEFAULT_SINCE_LIMIT: usize = 1000;

/// Counters for one backfill pass.
///
/// `records_sent + records_failed` equals the number of records produced by
/// every document that expanded successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub documents_read: usize,
    pub documents_failed: usize,
    pub records_sent: usize,
    pub records_failed: usize,
    /// The sink rejected our credentials and the pass stopped early.
    pub aborted: bool,
}

impl BackfillSummary {
    pub fn records_total(&self) -> usize {
        self.records_sent + self.records_failed
    }
}

fn document_label(document: &Value) -> &str {
    ["event_id", "run_id"]
        .iter()
        .find_map(|key| document.get(*key).and_then(Value::as_str))
        .unwrap_or("<unknown>")
}

/// Reads run documents from a store and streams their records to a sink.
pub struct MetadataStreamer<St, Si> {
    store: St,
    client: DeliveryClient<Si>,
    expander: RecordExpander,
    clock: Arc<dyn Clock>,
}

impl<St: SourceStore, Si: IngestSink> MetadataStreamer<St, Si> {
    pub fn new(store: St, client: DeliveryClient<Si>) -> Self {
        Self {
            store,
            client,
            expander: RecordExpander::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_expander(mut self, expander: RecordExpander) -> Self {
        self.expander = expander;
        self
    }

    /// Clock used for the upper bound of `stream_since`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn client(&self) -> &DeliveryClient<Si> {
        &self.client
    }

    /// Expand one document and deliver its records.
    pub async fn stream_one(&self, document: &Value) -> StreamerResult<DeliveryOutcome> {
        let records = self.expander.expand_value(document)?;
        let run_id = records
            .first()
            .map(|r| r.run_id().to_string())
            .unwrap_or_default();
        debug!(run_id = %run_id, records = records.len(), "Run document expanded");

        let outcome = self.client.send(&records).await?;
        if outcome.is_complete() {
            info!(run_id = %run_id, delivered = outcome.delivered, "Run streamed");
        } else {
            warn!(
                run_id = %run_id,
                delivered = outcome.delivered,
                failed = outcome.failed,
                "Run streamed with failures"
            );
        }
        Ok(outcome)
    }

    /// Look a run up in the store and stream it.
    pub async fn stream_by_id(&self, run_id: &str) -> StreamerResult<DeliveryOutcome> {
        let document = self
            .store
            .fetch_by_id(run_id)
            .await?
            .ok_or_else(|| StreamerError::NotFound(run_id.to_string()))?;
        self.stream_one(&document).await
    }

    /// Replay up to `limit` of the most recent documents, newest first.
    pub async fn backfill(&self, limit: usize) -> StreamerResult<BackfillSummary> {
        if limit == 0 {
            return Ok(BackfillSummary::default());
        }
        let documents = self.store.fetch_recent(limit).await?;
        info!(limit, documents = documents.len(), "Starting backfill");
        Ok(self.process_documents(documents).await)
    }

    /// Replay documents stamped between `since` and now, oldest first.
    pub async fn stream_since(&self, since: DateTime<Utc>) -> StreamerResult<BackfillSummary> {
        let now = self.clock.now();
        let documents = self
            .store
            .fetch_range(since, now, DEFAULT_SINCE_LIMIT)
            .await?;
        info!(%since, %now, documents = documents.len(), "Streaming documents since");
        Ok(self.process_documents(documents).await)
    }

    async fn process_documents(&self, documents: Vec<Value>) -> BackfillSummary {
        let mut summary = BackfillSummary::default();

        for document in &documents {
            summary.documents_read += 1;
            let label = document_label(document);

            let records = match self.expander.expand_value(document) {
                Ok(records) => records,
                Err(e) => {
                    warn!(run_id = %label, error = %e, "Skipping invalid run document");
                    summary.documents_failed += 1;
                    continue;
                }
            };

            match self.client.send(&records).await {
                Ok(outcome) => {
                    summary.records_sent += outcome.delivered;
                    summary.records_failed += outcome.failed;
                    debug!(
                        run_id = %label,
                        delivered = outcome.delivered,
                        failed = outcome.failed,
                        "Run document processed"
                    );
                }
                Err(DeliveryError::Auth { source, partial }) => {
                    error!(
                        run_id = %label,
                        delivered = partial.delivered,
                        failed = partial.failed,
                        error = %source,
                        "Sink rejected credentials, stopping"
                    );
                    summary.documents_failed += 1;
                    summary.records_sent += partial.delivered;
                    summary.records_failed += partial.failed;
                    summary.aborted = true;
                    break;
                }
                Err(e) => {
                    warn!(run_id = %label, error = %e, "Run document delivery failed");
                    summary.documents_failed += 1;
                    summary.records_failed += records.len();
                }
            }
        }

        info!(
            documents_read = summary.documents_read,
            documents_failed = summary.documents_failed,
            records_sent = summary.records_sent,
            records_failed = summary.records_failed,
            aborted = summary.aborted,
            "Backfill finished"
        );
        summary
    }
}
