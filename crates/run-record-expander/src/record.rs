//! Output records emitted by the expander.
//!
//! Each record serializes to one flat JSON object carrying a `record_type`
//! discriminator (`run`, `step` or `call`). The downstream loader routes on
//! that field alone, so records of different kinds are never wrapped in a
//! shared envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminator values written to `record_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Run,
    Step,
    Call,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Step => "step",
            Self::Call => "call",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent record, one per source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub company_name: Option<String>,
    pub industry: Option<String>,
    pub status: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_latency_ms: Option<f64>,
    pub total_api_calls: u64,
    pub error_message: Option<String>,
}

/// Child record describing one pipeline step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    /// Foreign key to the owning [`RunRecord`].
    pub run_id: String,
    pub step_name: String,
    pub status: Option<String>,
    pub latency_ms: Option<f64>,
    pub error_message: Option<String>,
}

/// Child record describing one outbound search API call of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    /// Foreign key to the owning [`RunRecord`].
    pub run_id: String,
    pub query_used: Option<String>,
    pub results_returned: u64,
    pub latency_ms: Option<f64>,
    pub called_at: DateTime<Utc>,
}

/// Closed union over the three record kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum OutputRecord {
    Run(RunRecord),
    Step(StepRecord),
    Call(CallRecord),
}

impl OutputRecord {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Run(_) => RecordType::Run,
            Self::Step(_) => RecordType::Step,
            Self::Call(_) => RecordType::Call,
        }
    }

    /// The owning run identifier (the record's own id for `run` records).
    pub fn run_id(&self) -> &str {
        match self {
            Self::Run(run) => &run.run_id,
            Self::Step(step) => &step.run_id,
            Self::Call(call) => &call.run_id,
        }
    }

    /// The record's own identifier.
    pub fn record_id(&self) -> &str {
        match self {
            Self::Run(run) => &run.run_id,
            Self::Step(step) => &step.step_id,
            Self::Call(call) => &call.call_id,
        }
    }
}
