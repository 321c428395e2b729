//! Run record expansion.
//!
//! Turns one nested run document produced by the research agent into the
//! relational record family the warehouse loader expects:
//!
//! ```text
//! SourceDocument ──expand──▶ [run, step*, call*]
//! ```
//!
//! Documents come in two shapes, classified once at ingress:
//!
//! - **Detailed**: carries `steps` and/or `api_calls` sequences; every entry
//!   becomes one child record.
//! - **Flat** (legacy): run-level scalars only; expansion emits exactly one
//!   synthetic step and one synthetic call.
//!
//! This crate performs no I/O. Identifier generation and "now" are injected
//! through [`IdGenerator`] and [`Clock`].

mod document;
mod error;
mod expander;
mod record;

pub use document::{ApiCallEntry, DocumentShape, RunHeader, SourceDocument, StepEntry};
pub use error::{ExpandError, ExpandResult};
pub use expander::{
    Clock, FixedClock, IdGenerator, RecordExpander, SequentialIds, SystemClock, UuidIdGenerator,
    SYNTHETIC_STEP_NAME,
};
pub use record::{CallRecord, OutputRecord, RecordType, RunRecord, StepRecord};
