//! Document to record expansion.

use crate::{
    ApiCallEntry, CallRecord, DocumentShape, ExpandResult, OutputRecord, RunHeader, RunRecord,
    SourceDocument, StepEntry, StepRecord,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Step name used for the synthetic step of a legacy document.
pub const SYNTHETIC_STEP_NAME: &str = "research";

/// Source of fresh record identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic `{prefix}-{n}` identifiers, for tests and replays that
/// need stable output.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

/// Source of "now" for documents without explicit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Turns one source document into `[run, step*, call*]`.
#[derive(Clone)]
pub struct RecordExpander {
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl Default for RecordExpander {
    fn default() -> Self {
        Self::new(Arc::new(UuidIdGenerator), Arc::new(SystemClock))
    }
}

impl RecordExpander {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { ids, clock }
    }

    /// Classify a raw document and expand it.
    ///
    /// Validation happens entirely before any record is built, so a failing
    /// document never yields a partial record list.
    pub fn expand_value(&self, value: &Value) -> ExpandResult<Vec<OutputRecord>> {
        let document = SourceDocument::from_value(value)?;
        Ok(self.expand(&document))
    }

    /// Expand a classified document.
    ///
    /// Step and call records reference the run record's identifier. A missing
    /// `steps` or `api_calls` sequence yields exactly one synthetic record of
    /// that kind; a present but empty sequence yields none.
    pub fn expand(&self, document: &SourceDocument) -> Vec<OutputRecord> {
        let header = document.header();
        let now = self.clock.now();

        let (steps, api_calls) = match document.shape() {
            DocumentShape::Detailed { steps, api_calls } => (steps.as_deref(), api_calls.as_deref()),
            DocumentShape::Flat => (None, None),
        };

        let step_count = steps.map_or(1, <[StepEntry]>::len);
        let call_count = api_calls.map_or(1, <[ApiCallEntry]>::len);
        let mut records = Vec::with_capacity(1 + step_count + call_count);

        records.push(OutputRecord::Run(self.run_record(header, api_calls, now)));

        match steps {
            Some(steps) => records.extend(
                steps
                    .iter()
                    .map(|step| OutputRecord::Step(self.step_record(header, step))),
            ),
            None => records.push(OutputRecord::Step(self.synthetic_step(header))),
        }

        match api_calls {
            Some(calls) => records.extend(
                calls
                    .iter()
                    .map(|call| OutputRecord::Call(self.call_record(header, call, now))),
            ),
            None => records.push(OutputRecord::Call(self.synthetic_call(header, now))),
        }

        records
    }

    fn run_record(
        &self,
        header: &RunHeader,
        api_calls: Option<&[ApiCallEntry]>,
        now: DateTime<Utc>,
    ) -> RunRecord {
        let fallback = header.timestamp.unwrap_or(now);
        RunRecord {
            run_id: header.run_id.clone(),
            company_name: header
                .company_name
                .clone()
                .or_else(|| header.query.clone()),
            industry: header.industry.clone(),
            status: header.status.clone(),
            started_at: header.started_at.unwrap_or(fallback),
            completed_at: header.completed_at.unwrap_or(fallback),
            total_latency_ms: header.latency_ms,
            total_api_calls: api_calls.map_or(header.num_sources, |calls| calls.len() as u64),
            error_message: header.error_message.clone(),
        }
    }

    fn step_record(&self, header: &RunHeader, step: &StepEntry) -> StepRecord {
        StepRecord {
            step_id: self.ids.next_id(),
            run_id: header.run_id.clone(),
            step_name: step.name.clone(),
            status: step.status.clone(),
            latency_ms: step.latency_ms,
            error_message: step.error.clone(),
        }
    }

    fn synthetic_step(&self, header: &RunHeader) -> StepRecord {
        StepRecord {
            step_id: self.ids.next_id(),
            run_id: header.run_id.clone(),
            step_name: SYNTHETIC_STEP_NAME.to_string(),
            status: header.status.clone(),
            latency_ms: header.latency_ms,
            error_message: header.error_message.clone(),
        }
    }

    fn call_record(&self, header: &RunHeader, call: &ApiCallEntry, now: DateTime<Utc>) -> CallRecord {
        CallRecord {
            call_id: self.ids.next_id(),
            run_id: header.run_id.clone(),
            query_used: call.query.clone(),
            results_returned: call.results_count,
            latency_ms: call.latency_ms,
            called_at: call.called_at.or(header.timestamp).unwrap_or(now),
        }
    }

    fn synthetic_call(&self, header: &RunHeader, now: DateTime<Utc>) -> CallRecord {
        CallRecord {
            call_id: self.ids.next_id(),
            run_id: header.run_id.clone(),
            query_used: header.query.clone(),
            results_returned: header.num_sources,
            latency_ms: header.latency_ms,
            called_at: header.timestamp.unwrap_or(now),
        }
    }
}
