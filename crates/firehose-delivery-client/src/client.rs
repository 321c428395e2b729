//! Batch delivery with bounded retry and per-record accounting.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, DeliveryResult, SinkError};
use crate::http_sink::HttpIngestSink;
use crate::sink::{EncodedRecord, IngestSink, PutBatchResponse, SinkIdentity};

/// Reason attached to trailing records when the sink's per-record results
/// cannot be lined up with the request.
pub const UNCORRELATED_REJECTION: &str = "uncorrelated rejection";

/// Lifecycle of one chunk within a `send` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkState {
    Pending,
    Sending { attempt: u32 },
    Retrying { attempt: u32, delay: Duration },
    Delivered,
    PartiallyDelivered { rejected: usize },
    Failed { reason: String, exhausted: bool },
}

impl ChunkState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::PartiallyDelivered { .. } | Self::Failed { .. }
        )
    }
}

/// A record that did not make it into the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// Position in the input slice.
    pub index: usize,
    /// Chunk the record travelled in, `None` if it never left the client.
    pub chunk: Option<usize>,
    pub error_code: Option<String>,
    pub message: String,
}

/// How one chunk ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkReport {
    pub index: usize,
    pub records: usize,
    pub attempts: u32,
    pub state: ChunkState,
}

/// Aggregate result of a `send` call. `delivered + failed` always equals the
/// number of input records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryOutcome {
    pub delivered: usize,
    pub failed: usize,
    pub failures: Vec<RecordFailure>,
    pub chunks: Vec<ChunkReport>,
}

impl DeliveryOutcome {
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

impl DeliveryOutcome {
    fn tally(&mut self, total: usize) {
        self.failures.sort_by_key(|f| f.index);
        self.failed = self.failures.len();
        self.delivered = total - self.failed;
    }
}

struct ChunkResult {
    report: ChunkReport,
    failures: Vec<RecordFailure>,
    last_error: Option<SinkError>,
}

/// The sink refused our credentials mid-chunk.
struct CredentialsRejected {
    attempts: u32,
    error: SinkError,
}

/// Delivers serialized records to an [`IngestSink`] in chunks of at most 25.
pub struct DeliveryClient<S> {
    config: DeliveryConfig,
    sink: S,
    identity: SinkIdentity,
}

impl DeliveryClient<HttpIngestSink> {
    /// Build the HTTP sink from `config` and connect to it.
    pub async fn connect_http(config: DeliveryConfig) -> DeliveryResult<Self> {
        config.validate()?;
        let sink = HttpIngestSink::new(&config)?;
        Self::connect(config, sink).await
    }
}

impl<S: IngestSink> DeliveryClient<S> {
    /// Validate `config` and verify credentials before anything is sent.
    pub async fn connect(config: DeliveryConfig, sink: S) -> DeliveryResult<Self> {
        config.validate()?;
        let identity = check_sink(&sink).await?;

        info!(
            stream = %config.stream_name,
            account = identity.account.as_deref().unwrap_or("unknown"),
            "Delivery client connected"
        );

        Ok(Self {
            config,
            sink,
            identity,
        })
    }

    /// Re-run the credential check.
    pub async fn preflight(&self) -> DeliveryResult<SinkIdentity> {
        check_sink(&self.sink).await
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn identity(&self) -> &SinkIdentity {
        &self.identity
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Deliver a single record.
    pub async fn send_one<T: Serialize>(&self, record: &T) -> DeliveryResult<DeliveryOutcome> {
        self.send(std::slice::from_ref(record)).await
    }

    /// Deliver `records` in order, chunk by chunk.
    ///
    /// Record-level rejections and chunk failures are counted in the
    /// outcome. Errors are returned only for credential failures and when
    /// every chunk exhausted its retries.
    pub async fn send<T: Serialize>(&self, records: &[T]) -> DeliveryResult<DeliveryOutcome> {
        let mut outcome = DeliveryOutcome::default();
        if records.is_empty() {
            return Ok(outcome);
        }

        let mut encoded: Vec<(usize, EncodedRecord)> = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match EncodedRecord::from_serializable(record) {
                Ok(data) => encoded.push((index, data)),
                Err(e) => {
                    warn!(index, error = %e, "Record could not be serialized");
                    outcome.failures.push(RecordFailure {
                        index,
                        chunk: None,
                        error_code: None,
                        message: format!("serialization failed: {e}"),
                    });
                }
            }
        }

        let chunks: Vec<&[(usize, EncodedRecord)]> =
            encoded.chunks(self.config.batch_size).collect();
        let mut last_error = None;
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let result = match self.send_chunk(chunk_index, chunk).await {
                Ok(result) => result,
                Err(rejected) => {
                    self.charge_remaining(&mut outcome, &chunks, chunk_index, &rejected);
                    outcome.tally(records.len());
                    return Err(DeliveryError::Auth {
                        source: rejected.error,
                        partial: Box::new(outcome),
                    });
                }
            };
            outcome.failures.extend(result.failures);
            outcome.chunks.push(result.report);
            if result.last_error.is_some() {
                last_error = result.last_error;
            }
        }

        outcome.tally(records.len());

        let all_exhausted = !outcome.chunks.is_empty()
            && outcome
                .chunks
                .iter()
                .all(|c| matches!(c.state, ChunkState::Failed { exhausted: true, .. }));
        if all_exhausted {
            if let Some(last_error) = last_error {
                error!(
                    stream = %self.config.stream_name,
                    records = records.len(),
                    attempts = self.config.max_attempts,
                    error = %last_error,
                    "Sink unreachable, retries exhausted on every chunk"
                );
                return Err(DeliveryError::Unreachable {
                    records: records.len(),
                    attempts: self.config.max_attempts,
                    last_error,
                });
            }
        }

        info!(
            stream = %self.config.stream_name,
            delivered = outcome.delivered,
            failed = outcome.failed,
            chunks = outcome.chunks.len(),
            "Delivery finished"
        );
        Ok(outcome)
    }

    /// Count the rejected chunk and every chunk after it as failed.
    fn charge_remaining(
        &self,
        outcome: &mut DeliveryOutcome,
        chunks: &[&[(usize, EncodedRecord)]],
        rejected_chunk: usize,
        rejected: &CredentialsRejected,
    ) {
        let reason = rejected.error.to_string();
        for (chunk_index, chunk) in chunks.iter().enumerate().skip(rejected_chunk) {
            let sent = chunk_index == rejected_chunk;
            let message = if sent {
                reason.clone()
            } else {
                format!("not sent: {reason}")
            };
            outcome
                .failures
                .extend(chunk.iter().map(|(index, _)| RecordFailure {
                    index: *index,
                    chunk: sent.then_some(chunk_index),
                    error_code: None,
                    message: message.clone(),
                }));
            outcome.chunks.push(ChunkReport {
                index: chunk_index,
                records: chunk.len(),
                attempts: if sent { rejected.attempts } else { 0 },
                state: ChunkState::Failed {
                    reason: message,
                    exhausted: false,
                },
            });
        }
        warn!(
            stream = %self.config.stream_name,
            stopped_at_chunk = rejected_chunk,
            chunks_not_sent = chunks.len() - rejected_chunk - 1,
            "Delivery stopped on rejected credentials"
        );
    }

    async fn send_chunk(
        &self,
        chunk_index: usize,
        chunk: &[(usize, EncodedRecord)],
    ) -> Result<ChunkResult, CredentialsRejected> {
        let positions: Vec<usize> = chunk.iter().map(|(i, _)| *i).collect();
        let payload: Vec<EncodedRecord> = chunk.iter().map(|(_, r)| r.clone()).collect();

        let mut state = ChunkState::Pending;
        let mut attempts = 0;
        let mut failures = Vec::new();
        let mut last_error = None;

        loop {
            let next = match &state {
                ChunkState::Pending => ChunkState::Sending { attempt: 1 },
                ChunkState::Retrying { attempt, delay } => {
                    tokio::time::sleep(*delay).await;
                    ChunkState::Sending {
                        attempt: attempt + 1,
                    }
                }
                ChunkState::Sending { attempt } => {
                    attempts = *attempt;
                    match self.sink.put_batch(&payload).await {
                        Ok(response) => {
                            failures = correlate_rejections(chunk_index, &positions, &response);
                            if failures.is_empty() {
                                ChunkState::Delivered
                            } else {
                                ChunkState::PartiallyDelivered {
                                    rejected: failures.len(),
                                }
                            }
                        }
                        Err(err) if err.is_auth() => {
                            error!(
                                chunk = chunk_index,
                                attempt = *attempt,
                                error = %err,
                                "Sink rejected credentials"
                            );
                            return Err(CredentialsRejected {
                                attempts: *attempt,
                                error: err,
                            });
                        }
                        Err(err) if err.is_transient() && *attempt < self.config.max_attempts => {
                            let delay = self.config.retry_delay(*attempt);
                            warn!(
                                chunk = chunk_index,
                                attempt = *attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "Chunk send failed, retrying"
                            );
                            last_error = Some(err);
                            ChunkState::Retrying {
                                attempt: *attempt,
                                delay,
                            }
                        }
                        Err(err) => {
                            let exhausted = err.is_transient();
                            let reason = err.to_string();
                            failures = positions
                                .iter()
                                .map(|&index| RecordFailure {
                                    index,
                                    chunk: Some(chunk_index),
                                    error_code: None,
                                    message: reason.clone(),
                                })
                                .collect();
                            last_error = Some(err);
                            ChunkState::Failed { reason, exhausted }
                        }
                    }
                }
                ChunkState::Delivered
                | ChunkState::PartiallyDelivered { .. }
                | ChunkState::Failed { .. } => break,
            };
            debug!(chunk = chunk_index, from = ?state, to = ?next, "Chunk state change");
            state = next;
        }

        match &state {
            ChunkState::Delivered => info!(
                chunk = chunk_index,
                records = positions.len(),
                attempts,
                "Chunk delivered"
            ),
            ChunkState::PartiallyDelivered { rejected } => warn!(
                chunk = chunk_index,
                records = positions.len(),
                rejected = *rejected,
                "Chunk partially delivered"
            ),
            ChunkState::Failed { reason, .. } => error!(
                chunk = chunk_index,
                records = positions.len(),
                attempts,
                error = %reason,
                "Chunk failed"
            ),
            _ => {}
        }

        let last_error = if matches!(state, ChunkState::Failed { .. }) {
            last_error
        } else {
            None
        };

        Ok(ChunkResult {
            report: ChunkReport {
                index: chunk_index,
                records: positions.len(),
                attempts,
                state,
            },
            failures,
            last_error,
        })
    }
}

async fn check_sink<S: IngestSink>(sink: &S) -> DeliveryResult<SinkIdentity> {
    sink.check_identity().await.map_err(|e| {
        error!(error = %e, "Sink preflight failed");
        DeliveryError::Config(format!("sink credential check failed: {e}"))
    })
}

/// Map a batch response back onto input positions.
///
/// When the sink returns one result per record, rejections are positional.
/// Whatever `failed_put_count` declares beyond the flagged entries (or
/// beyond a misaligned response) is charged to the trailing records that
/// are not already counted.
fn correlate_rejections(
    chunk_index: usize,
    positions: &[usize],
    response: &PutBatchResponse,
) -> Vec<RecordFailure> {
    let mut failures: Vec<RecordFailure> = Vec::new();
    if response.entries.len() == positions.len() {
        failures.extend(
            positions
                .iter()
                .zip(&response.entries)
                .filter(|(_, entry)| entry.is_rejected())
                .map(|(&index, entry)| RecordFailure {
                    index,
                    chunk: Some(chunk_index),
                    error_code: entry.error_code.clone(),
                    message: entry
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "rejected by sink".to_string()),
                }),
        );
    }

    let declared = response.failed_put_count.min(positions.len());
    if declared <= failures.len() {
        return failures;
    }

    warn!(
        chunk = chunk_index,
        expected = positions.len(),
        returned = response.entries.len(),
        flagged = failures.len(),
        failed_put_count = response.failed_put_count,
        "Sink results do not line up with request"
    );
    let shortfall = declared - failures.len();
    let mut uncorrelated: Vec<RecordFailure> = positions
        .iter()
        .rev()
        .filter(|index| !failures.iter().any(|f| f.index == **index))
        .take(shortfall)
        .map(|&index| RecordFailure {
            index,
            chunk: Some(chunk_index),
            error_code: None,
            message: UNCORRELATED_REJECTION.to_string(),
        })
        .collect();
    uncorrelated.reverse();
    failures.extend(uncorrelated);
    failures.sort_by_key(|f| f.index);
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkResult;
    use crate::sink::RecordResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    type Handler = dyn Fn(usize, &[EncodedRecord]) -> SinkResult<PutBatchResponse> + Send + Sync;

    struct MockSink {
        identity_fails: bool,
        handler: Box<Handler>,
        identity_calls: AtomicUsize,
        puts: Mutex<Vec<(Instant, usize)>>,
    }

    impl MockSink {
        fn new(
            handler: impl Fn(usize, &[EncodedRecord]) -> SinkResult<PutBatchResponse>
                + Send
                + Sync
                + 'static,
        ) -> Arc<Self> {
            Self::build(false, handler)
        }

        fn build(
            identity_fails: bool,
            handler: impl Fn(usize, &[EncodedRecord]) -> SinkResult<PutBatchResponse>
                + Send
                + Sync
                + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                identity_fails,
                handler: Box::new(handler),
                identity_calls: AtomicUsize::new(0),
                puts: Mutex::new(Vec::new()),
            })
        }

        fn accepting() -> Arc<Self> {
            Self::new(|_, records| Ok(PutBatchResponse::all_accepted(records.len())))
        }

        fn put_count(&self) -> usize {
            self.puts.lock().unwrap().len()
        }

        fn put_sizes(&self) -> Vec<usize> {
            self.puts.lock().unwrap().iter().map(|(_, n)| *n).collect()
        }

        fn put_times(&self) -> Vec<Instant> {
            self.puts.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    #[async_trait]
    impl IngestSink for MockSink {
        async fn check_identity(&self) -> SinkResult<SinkIdentity> {
            self.identity_calls.fetch_add(1, Ordering::SeqCst);
            if self.identity_fails {
                return Err(SinkError::Auth {
                    status: 403,
                    message: "expired token".to_string(),
                });
            }
            Ok(SinkIdentity {
                account: Some("123456789012".to_string()),
                arn: None,
            })
        }

        async fn put_batch(&self, records: &[EncodedRecord]) -> SinkResult<PutBatchResponse> {
            let call = {
                let mut puts = self.puts.lock().unwrap();
                puts.push((Instant::now(), records.len()));
                puts.len() - 1
            };
            (self.handler)(call, records)
        }
    }

    fn records(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"record_type": "step", "step_id": format!("s-{i}")}))
            .collect()
    }

    fn config() -> DeliveryConfig {
        DeliveryConfig {
            auth_token: "test-token".to_string(),
            ..Default::default()
        }
    }

    async fn client(sink: Arc<MockSink>) -> DeliveryClient<Arc<MockSink>> {
        DeliveryClient::connect(config(), sink)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let sink = MockSink::accepting();
        let client = client(sink.clone()).await;

        let outcome = client.send::<Value>(&[]).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::default());
        assert_eq!(sink.put_count(), 0);
    }

    #[tokio::test]
    async fn splits_into_chunks_of_25_in_order() {
        let sink = MockSink::accepting();
        let client = client(sink.clone()).await;

        let outcome = client.send(&records(60)).await.unwrap();
        assert_eq!(outcome.delivered, 60);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.is_complete());
        assert_eq!(sink.put_sizes(), vec![25, 25, 10]);
        assert!(outcome
            .chunks
            .iter()
            .all(|c| c.state == ChunkState::Delivered && c.attempts == 1));
    }

    #[tokio::test]
    async fn positional_rejections_are_counted_not_retried() {
        let sink = MockSink::new(|call, records| {
            if call == 0 {
                Ok(PutBatchResponse::with_rejections(
                    records.len(),
                    &[1, 4, 9],
                    "ServiceUnavailableException",
                ))
            } else {
                Ok(PutBatchResponse::all_accepted(records.len()))
            }
        });
        let client = client(sink.clone()).await;

        let outcome = client.send(&records(30)).await.unwrap();
        assert_eq!(outcome.delivered, 27);
        assert_eq!(outcome.failed, 3);
        assert_eq!(outcome.total(), 30);
        let indices: Vec<usize> = outcome.failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 4, 9]);
        assert_eq!(
            outcome.failures[0].error_code.as_deref(),
            Some("ServiceUnavailableException")
        );
        assert_eq!(
            outcome.chunks[0].state,
            ChunkState::PartiallyDelivered { rejected: 3 }
        );
        assert_eq!(sink.put_count(), 2);
    }

    #[tokio::test]
    async fn misaligned_results_mark_trailing_records() {
        let sink = MockSink::new(|_, _| {
            Ok(PutBatchResponse {
                failed_put_count: 2,
                entries: vec![RecordResult::accepted("only-one")],
            })
        });
        let client = client(sink).await;

        let outcome = client.send(&records(5)).await.unwrap();
        assert_eq!(outcome.delivered, 3);
        let indices: Vec<usize> = outcome.failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![3, 4]);
        assert!(outcome
            .failures
            .iter()
            .all(|f| f.message == UNCORRELATED_REJECTION));
    }

    #[test]
    fn declared_failures_without_error_codes_are_counted() {
        let response = PutBatchResponse {
            failed_put_count: 2,
            entries: vec![RecordResult::default(); 5],
        };

        let failures = correlate_rejections(0, &[0, 1, 2, 3, 4], &response);
        let indices: Vec<usize> = failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![3, 4]);
        assert!(failures.iter().all(|f| f.message == UNCORRELATED_REJECTION));
    }

    #[test]
    fn shortfall_skips_records_already_flagged() {
        let mut entries = vec![RecordResult::default(); 5];
        entries[4].error_code = Some("InternalFailure".to_string());
        let response = PutBatchResponse {
            failed_put_count: 3,
            entries,
        };

        let failures = correlate_rejections(1, &[10, 11, 12, 13, 14], &response);
        let indices: Vec<usize> = failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![12, 13, 14]);
        assert_eq!(failures[2].error_code.as_deref(), Some("InternalFailure"));
        assert_eq!(failures[0].message, UNCORRELATED_REJECTION);
        assert!(failures.iter().all(|f| f.chunk == Some(1)));
    }

    #[tokio::test]
    async fn declared_count_drives_partial_delivery_state() {
        let sink = MockSink::new(|_, records| {
            Ok(PutBatchResponse {
                failed_put_count: 2,
                entries: vec![RecordResult::default(); records.len()],
            })
        });
        let client = client(sink).await;

        let outcome = client.send(&records(5)).await.unwrap();
        assert_eq!(outcome.delivered, 3);
        assert_eq!(outcome.failed, 2);
        assert_eq!(
            outcome.chunks[0].state,
            ChunkState::PartiallyDelivered { rejected: 2 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_growing_delay_then_give_up() {
        let sink = MockSink::new(|_, _| Err(SinkError::Timeout));
        let client = client(sink.clone()).await;

        let err = client.send(&records(4)).await.unwrap_err();
        match err {
            DeliveryError::Unreachable {
                records,
                attempts,
                last_error,
            } => {
                assert_eq!(records, 4);
                assert_eq!(attempts, 3);
                assert!(matches!(last_error, SinkError::Timeout));
            }
            other => panic!("expected Unreachable, got {other:?}"),
        }

        assert_eq!(sink.put_count(), 3);
        let times = sink.put_times();
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert_eq!(first_gap, Duration::from_millis(1000));
        assert_eq!(second_gap, Duration::from_millis(2000));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_then_accepted_delivers_everything() {
        let sink = MockSink::new(|call, records| {
            if call == 0 {
                Err(SinkError::Throttled("slow down".to_string()))
            } else {
                Ok(PutBatchResponse::all_accepted(records.len()))
            }
        });
        let client = client(sink.clone()).await;

        let outcome = client.send(&records(3)).await.unwrap();
        assert_eq!(outcome.delivered, 3);
        assert_eq!(outcome.chunks[0].attempts, 2);
        assert_eq!(sink.put_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn one_exhausted_chunk_is_a_partial_outcome() {
        let sink = MockSink::new(|call, records| {
            if call == 0 {
                Ok(PutBatchResponse::all_accepted(records.len()))
            } else {
                Err(SinkError::Server {
                    status: 500,
                    message: "boom".to_string(),
                })
            }
        });
        let client = client(sink.clone()).await;

        let outcome = client.send(&records(30)).await.unwrap();
        assert_eq!(outcome.delivered, 25);
        assert_eq!(outcome.failed, 5);
        assert!(matches!(
            outcome.chunks[1].state,
            ChunkState::Failed { exhausted: true, .. }
        ));
        assert_eq!(sink.put_count(), 4);
    }

    #[tokio::test]
    async fn rejected_request_is_not_retried() {
        let sink = MockSink::new(|_, _| {
            Err(SinkError::Rejected {
                status: 400,
                message: "malformed".to_string(),
            })
        });
        let client = client(sink.clone()).await;

        let outcome = client.send(&records(2)).await.unwrap();
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.failed, 2);
        assert_eq!(sink.put_count(), 1);
        assert!(matches!(
            outcome.chunks[0].state,
            ChunkState::Failed { exhausted: false, .. }
        ));
    }

    #[tokio::test]
    async fn auth_failure_aborts_without_retry() {
        let sink = MockSink::new(|_, _| {
            Err(SinkError::Auth {
                status: 401,
                message: "token expired".to_string(),
            })
        });
        let client = client(sink.clone()).await;

        let err = client.send(&records(60)).await.unwrap_err();
        match err {
            DeliveryError::Auth { partial, .. } => {
                assert_eq!(partial.delivered, 0);
                assert_eq!(partial.failed, 60);
                assert_eq!(partial.chunks.len(), 3);
                assert_eq!(partial.chunks[0].attempts, 1);
                assert_eq!(partial.chunks[2].attempts, 0);
                assert_eq!(partial.failures[59].chunk, None);
            }
            other => panic!("expected Auth, got {other:?}"),
        }
        assert_eq!(sink.put_count(), 1);
    }

    #[tokio::test]
    async fn auth_failure_on_later_chunk_keeps_earlier_deliveries() {
        let sink = MockSink::new(|call, records| {
            if call == 0 {
                Ok(PutBatchResponse::all_accepted(records.len()))
            } else {
                Err(SinkError::Auth {
                    status: 401,
                    message: "token revoked".to_string(),
                })
            }
        });
        let client = client(sink.clone()).await;

        let err = client.send(&records(32)).await.unwrap_err();
        let DeliveryError::Auth { partial, .. } = err else {
            panic!("expected Auth");
        };
        assert_eq!(partial.delivered, 25);
        assert_eq!(partial.failed, 7);
        assert_eq!(partial.total(), 32);
        assert_eq!(partial.chunks[0].state, ChunkState::Delivered);
        assert!(matches!(
            partial.chunks[1].state,
            ChunkState::Failed { exhausted: false, .. }
        ));
        let indices: Vec<usize> = partial.failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, (25..32).collect::<Vec<_>>());
        assert!(partial.failures.iter().all(|f| f.chunk == Some(1)));
        assert_eq!(sink.put_count(), 2);
    }

    #[tokio::test]
    async fn preflight_failure_blocks_connect() {
        let sink = MockSink::build(true, |_, records| {
            Ok(PutBatchResponse::all_accepted(records.len()))
        });

        let result = DeliveryClient::connect(config(), sink.clone()).await;
        assert!(matches!(result, Err(DeliveryError::Config(_))));
        assert_eq!(sink.identity_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.put_count(), 0);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_identity_check() {
        let sink = MockSink::accepting();
        let bad = DeliveryConfig {
            stream_name: String::new(),
            ..config()
        };

        let result = DeliveryClient::connect(bad, sink.clone()).await;
        assert!(matches!(result, Err(DeliveryError::Config(_))));
        assert_eq!(sink.identity_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn send_one_wraps_a_single_record() {
        let sink = MockSink::accepting();
        let client = client(sink.clone()).await;

        let outcome = client.send_one(&json!({"record_type": "run"})).await.unwrap();
        assert_eq!(outcome.delivered, 1);
        assert_eq!(sink.put_sizes(), vec![1]);
        assert_eq!(client.identity().account.as_deref(), Some("123456789012"));
    }

    #[test]
    fn terminal_states() {
        assert!(!ChunkState::Pending.is_terminal());
        assert!(!ChunkState::Sending { attempt: 1 }.is_terminal());
        assert!(ChunkState::Delivered.is_terminal());
        assert!(ChunkState::Failed {
            reason: "x".into(),
            exhausted: false
        }
        .is_terminal());
    }
}
