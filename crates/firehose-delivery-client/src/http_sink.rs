//! HTTP ingestion sink speaking the Firehose batch-put JSON protocol.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, DeliveryResult, SinkError, SinkResult};
use crate::sink::{EncodedRecord, IngestSink, PutBatchResponse, RecordResult, SinkIdentity};

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordBatchRequest<'a> {
    delivery_stream_name: &'a str,
    records: Vec<WireRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireRecord {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordBatchResponse {
    #[serde(default)]
    failed_put_count: usize,
    #[serde(default)]
    request_responses: Vec<WireRecordResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireRecordResult {
    #[serde(default)]
    record_id: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdentityResponse {
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    arn: Option<String>,
}

/// Sink backed by the ingestion service's HTTP API.
pub struct HttpIngestSink {
    client: Client,
    endpoint: String,
    stream_name: String,
    auth_token: String,
}

impl HttpIngestSink {
    /// Build a sink for `config`. The stream name must be path-safe.
    pub fn new(config: &DeliveryConfig) -> DeliveryResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DeliveryError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            stream_name: config.stream_name.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    fn records_url(&self) -> String {
        format!("{}/streams/{}/records", self.endpoint, self.stream_name)
    }

    fn identity_url(&self) -> String {
        format!("{}/identity", self.endpoint)
    }

    async fn read_body(response: reqwest::Response) -> SinkResult<(StatusCode, String)> {
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

/// Map a non-success status to the matching sink error.
fn classify_status(status: StatusCode, body: &str) -> SinkError {
    let message = summarize_body(body);
    let code = status.as_u16();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SinkError::Auth {
            status: code,
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => SinkError::Throttled(message),
        s if s.is_server_error() => SinkError::Server {
            status: code,
            message,
        },
        _ => SinkError::Rejected {
            status: code,
            message,
        },
    }
}

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}...")
    }
}

#[async_trait]
impl IngestSink for HttpIngestSink {
    async fn check_identity(&self) -> SinkResult<SinkIdentity> {
        let url = self.identity_url();
        debug!(url = %url, "Checking sink identity");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        let (status, body) = Self::read_body(response).await?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let identity: IdentityResponse = serde_json::from_str(&body)
            .map_err(|e| SinkError::InvalidResponse(format!("identity: {e}")))?;
        Ok(SinkIdentity {
            account: identity.account,
            arn: identity.arn,
        })
    }

    async fn put_batch(&self, records: &[EncodedRecord]) -> SinkResult<PutBatchResponse> {
        let url = self.records_url();
        let request = PutRecordBatchRequest {
            delivery_stream_name: &self.stream_name,
            records: records
                .iter()
                .map(|r| WireRecord {
                    data: BASE64.encode(r.as_bytes()),
                })
                .collect(),
        };

        debug!(
            url = %url,
            stream = %self.stream_name,
            records = records.len(),
            "Putting record batch"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(&request)
            .send()
            .await?;
        let (status, body) = Self::read_body(response).await?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: PutRecordBatchResponse = serde_json::from_str(&body)
            .map_err(|e| SinkError::InvalidResponse(format!("put batch: {e}")))?;
        Ok(PutBatchResponse {
            failed_put_count: parsed.failed_put_count,
            entries: parsed
                .request_responses
                .into_iter()
                .map(|r| RecordResult {
                    record_id: r.record_id,
                    error_code: r.error_code,
                    error_message: r.error_message,
                })
                .collect(),
        })
    }
}
