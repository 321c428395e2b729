//! The seam between the delivery client and the ingestion service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SinkResult;

/// One record ready for the wire: its JSON form followed by a newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    data: Vec<u8>,
}

impl EncodedRecord {
    pub fn from_serializable<T: Serialize + ?Sized>(record: &T) -> serde_json::Result<Self> {
        let mut data = serde_json::to_vec(record)?;
        data.push(b'\n');
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Identity reported by the sink during preflight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkIdentity {
    pub account: Option<String>,
    pub arn: Option<String>,
}

/// Per-record result, positionally aligned with the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordResult {
    pub record_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl RecordResult {
    pub fn accepted(record_id: impl Into<String>) -> Self {
        Self {
            record_id: Some(record_id.into()),
            ..Default::default()
        }
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            record_id: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Answer to a batch put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutBatchResponse {
    pub failed_put_count: usize,
    pub entries: Vec<RecordResult>,
}

impl PutBatchResponse {
    /// Every one of `count` records accepted.
    pub fn all_accepted(count: usize) -> Self {
        Self {
            failed_put_count: 0,
            entries: (0..count)
                .map(|i| RecordResult::accepted(format!("rec-{i}")))
                .collect(),
        }
    }

    /// `count` records, with the given positions rejected.
    pub fn with_rejections(count: usize, rejected: &[usize], code: &str) -> Self {
        let entries: Vec<RecordResult> = (0..count)
            .map(|i| {
                if rejected.contains(&i) {
                    RecordResult::rejected(code, format!("record {i} rejected"))
                } else {
                    RecordResult::accepted(format!("rec-{i}"))
                }
            })
            .collect();
        Self {
            failed_put_count: entries.iter().filter(|e| e.is_rejected()).count(),
            entries,
        }
    }
}

/// Ingestion service capable of accepting record batches.
#[async_trait]
pub trait IngestSink: Send + Sync {
    /// Verify credentials. Called once before any record is sent.
    async fn check_identity(&self) -> SinkResult<SinkIdentity>;

    /// Put one batch of at most 25 records.
    async fn put_batch(&self, records: &[EncodedRecord]) -> SinkResult<PutBatchResponse>;
}

#[async_trait]
impl<S: IngestSink + ?Sized> IngestSink for Arc<S> {
    async fn check_identity(&self) -> SinkResult<SinkIdentity> {
        (**self).check_identity().await
    }

    async fn put_batch(&self, records: &[EncodedRecord]) -> SinkResult<PutBatchResponse> {
        (**self).put_batch(records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encoded_record_is_newline_terminated_json() {
        let record = EncodedRecord::from_serializable(&json!({"record_type": "run"})).unwrap();
        assert_eq!(record.as_bytes(), b"{\"record_type\":\"run\"}\n");
        assert_eq!(record.len(), 22);
        assert!(!record.is_empty());
    }

    #[test]
    fn with_rejections_counts_failures() {
        let response = PutBatchResponse::with_rejections(5, &[1, 3], "InternalFailure");
        assert_eq!(response.failed_put_count, 2);
        assert_eq!(response.entries.len(), 5);
        assert!(response.entries[1].is_rejected());
        assert!(!response.entries[2].is_rejected());
    }
}
