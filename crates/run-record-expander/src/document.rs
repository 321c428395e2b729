//! Source documents as handed over by the run producer.
//!
//! A document is classified exactly once, when it crosses the ingress
//! boundary (`SourceDocument::from_value`). After that the expander works on
//! the typed [`DocumentShape`] and never re-inspects the raw JSON.

use crate::{ExpandError, ExpandResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Run-level scalars shared by both document shapes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunHeader {
    /// Stable run identifier (`event_id` in producer documents).
    pub run_id: String,
    /// Produce time of the document.
    pub timestamp: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Research query the run was started with.
    pub query: Option<String>,
    pub company_name: Option<String>,
    pub industry: Option<String>,
    /// Overall run status (`success`, `failure`, ...).
    pub status: Option<String>,
    pub latency_ms: Option<f64>,
    /// Number of sources the run returned.
    pub num_sources: u64,
    pub error_message: Option<String>,
}

/// One entry of a document's `steps` sequence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepEntry {
    #[serde(alias = "step_name")]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default, alias = "error_message")]
    pub error: Option<String>,
}

/// One entry of a document's `api_calls` sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCallEntry {
    pub query: Option<String>,
    pub results_count: u64,
    pub latency_ms: Option<f64>,
    pub called_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawApiCall {
    #[serde(default, alias = "query_used")]
    query: Option<String>,
    #[serde(default, alias = "results_returned", alias = "num_results")]
    results_count: Option<u64>,
    #[serde(default)]
    latency_ms: Option<f64>,
    #[serde(default, alias = "timestamp")]
    called_at: Option<String>,
}

/// The two supported document shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentShape {
    /// At least one detailed sequence is present. A missing sequence falls
    /// back to a single synthetic record of that kind.
    Detailed {
        steps: Option<Vec<StepEntry>>,
        api_calls: Option<Vec<ApiCallEntry>>,
    },
    /// Legacy document carrying only run-level scalars.
    Flat,
}

/// A classified run document.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    header: RunHeader,
    shape: DocumentShape,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(alias = "run_id")]
    event_id: Option<String>,
    timestamp_utc: Option<String>,
    started_at_utc: Option<String>,
    completed_at_utc: Option<String>,
    query: Option<String>,
    company_name: Option<String>,
    industry: Option<String>,
    status: Option<String>,
    latency_ms: Option<f64>,
    num_sources: Option<u64>,
    error_message: Option<String>,
    steps: Option<Value>,
    api_calls: Option<Value>,
}

impl SourceDocument {
    /// Build a document from already-typed parts.
    ///
    /// A `Detailed` shape with both sequences absent is normalized to `Flat`.
    pub fn new(header: RunHeader, shape: DocumentShape) -> ExpandResult<Self> {
        if header.run_id.trim().is_empty() {
            return Err(ExpandError::MissingRunId);
        }

        let shape = match shape {
            DocumentShape::Detailed {
                steps: None,
                api_calls: None,
            } => DocumentShape::Flat,
            other => other,
        };

        Ok(Self { header, shape })
    }

    /// Classify a raw producer document.
    pub fn from_value(value: &Value) -> ExpandResult<Self> {
        if !value.is_object() {
            return Err(ExpandError::NotAnObject);
        }

        let raw = RawDocument::deserialize(value)?;

        let run_id = raw
            .event_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ExpandError::MissingRunId)?;

        let header = RunHeader {
            run_id,
            timestamp: parse_optional_timestamp("timestamp_utc", raw.timestamp_utc.as_deref())?,
            started_at: parse_optional_timestamp("started_at_utc", raw.started_at_utc.as_deref())?,
            completed_at: parse_optional_timestamp(
                "completed_at_utc",
                raw.completed_at_utc.as_deref(),
            )?,
            query: raw.query,
            company_name: raw.company_name,
            industry: raw.industry,
            status: raw.status,
            latency_ms: raw.latency_ms,
            num_sources: raw.num_sources.unwrap_or(0),
            error_message: raw.error_message,
        };

        let steps: Option<Vec<StepEntry>> = parse_sequence("steps", raw.steps.as_ref())?;
        let api_calls = parse_sequence::<RawApiCall>("api_calls", raw.api_calls.as_ref())?
            .map(|calls| {
                calls
                    .into_iter()
                    .map(ApiCallEntry::try_from)
                    .collect::<ExpandResult<Vec<_>>>()
            })
            .transpose()?;

        Self::new(header, DocumentShape::Detailed { steps, api_calls })
    }

    /// Parse and classify a JSON string.
    pub fn from_json_str(json: &str) -> ExpandResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    pub fn header(&self) -> &RunHeader {
        &self.header
    }

    pub fn shape(&self) -> &DocumentShape {
        &self.shape
    }

    pub fn run_id(&self) -> &str {
        &self.header.run_id
    }

    /// True for legacy documents without any detailed sequence.
    pub fn is_flat(&self) -> bool {
        matches!(self.shape, DocumentShape::Flat)
    }
}

impl TryFrom<RawApiCall> for ApiCallEntry {
    type Error = ExpandError;

    fn try_from(raw: RawApiCall) -> ExpandResult<Self> {
        Ok(Self {
            query: raw.query,
            results_count: raw.results_count.unwrap_or(0),
            latency_ms: raw.latency_ms,
            called_at: parse_optional_timestamp("api_calls[].called_at", raw.called_at.as_deref())?,
        })
    }
}

fn parse_sequence<T: DeserializeOwned>(
    field: &'static str,
    raw: Option<&Value>,
) -> ExpandResult<Option<Vec<T>>> {
    let items = match raw {
        None => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ExpandError::InvalidSequence {
                field,
                reason: format!("expected an array, found {}", json_kind(other)),
            })
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            T::deserialize(item).map_err(|e| ExpandError::InvalidSequence {
                field,
                reason: format!("entry {index}: {e}"),
            })
        })
        .collect::<ExpandResult<Vec<T>>>()
        .map(Some)
}

fn parse_optional_timestamp(
    field: &'static str,
    raw: Option<&str>,
) -> ExpandResult<Option<DateTime<Utc>>> {
    raw.map(|value| parse_timestamp(field, value)).transpose()
}

/// Parse an RFC 3339 timestamp. Offset-less ISO-8601 values are read as UTC.
pub(crate) fn parse_timestamp(field: &'static str, raw: &str) -> ExpandResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ExpandError::InvalidTimestamp {
            field,
            value: raw.to_string(),
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
